//! Failed-login throttling per email.
//!
//! Once an email has `max_failures` failures inside `window`, further
//! attempts are refused without running the KDF until the window passes.
//! Records whose window has passed are swept when the map grows past
//! `sweep_threshold` and on every maintenance tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

struct FailureRecord {
    count: u32,
    window_start: Instant,
}

pub struct LoginThrottle {
    max_failures: u32,
    window: Duration,
    sweep_threshold: usize,
    failures: Mutex<HashMap<String, FailureRecord>>,
}

impl LoginThrottle {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold.max(1);
        self
    }

    /// `Err(retry_after)` while the email is locked out.
    pub fn check(&self, email: &str) -> Result<(), Duration> {
        let key = email.to_lowercase();
        let mut failures = self.failures.lock();

        let Some(record) = failures.get(&key) else {
            return Ok(());
        };

        let elapsed = record.window_start.elapsed();
        if elapsed >= self.window {
            failures.remove(&key);
            return Ok(());
        }
        if record.count >= self.max_failures {
            return Err(self.window - elapsed);
        }
        Ok(())
    }

    /// Returns the failure count inside the current window.
    pub fn record_failure(&self, email: &str) -> u32 {
        let key = email.to_lowercase();
        let mut failures = self.failures.lock();
        let now = Instant::now();

        if failures.len() >= self.sweep_threshold && !failures.contains_key(&key) {
            let window = self.window;
            failures.retain(|_, r| now.duration_since(r.window_start) < window);
        }

        let record = failures.entry(key).or_insert(FailureRecord {
            count: 0,
            window_start: now,
        });
        if now.duration_since(record.window_start) >= self.window {
            record.count = 0;
            record.window_start = now;
        }
        record.count += 1;
        record.count
    }

    pub fn reset(&self, email: &str) {
        self.failures.lock().remove(&email.to_lowercase());
    }

    /// Drop records whose window has passed. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut failures = self.failures.lock();
        let before = failures.len();
        let window = self.window;
        failures.retain(|_, r| r.window_start.elapsed() < window);
        before - failures.len()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES, DEFAULT_LOCKOUT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locks_after_max_failures() {
        let throttle = LoginThrottle::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            throttle.record_failure("ada@example.org");
            assert!(throttle.check("ada@example.org").is_ok());
        }
        assert_eq!(throttle.record_failure("ADA@example.org"), 3);

        let retry_after = throttle.check("ada@example.org").unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
        assert!(throttle.check("bob@example.org").is_ok());
    }

    #[test]
    fn test_reset_clears_failures() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));
        throttle.record_failure("ada@example.org");
        assert!(throttle.check("ada@example.org").is_err());

        throttle.reset("ada@example.org");
        assert!(throttle.check("ada@example.org").is_ok());
    }

    #[test]
    fn test_sweep_drops_stale_records() {
        let throttle = LoginThrottle::new(5, Duration::from_millis(10));
        for i in 0..50 {
            throttle.record_failure(&format!("user{}@example.org", i));
        }
        assert_eq!(throttle.len(), 50);

        std::thread::sleep(Duration::from_millis(20));
        throttle.record_failure("fresh@example.org");
        assert_eq!(throttle.sweep_expired(), 50);
        assert_eq!(throttle.len(), 1);
    }

    #[test]
    fn test_spraying_emails_stays_bounded() {
        let throttle = LoginThrottle::new(5, Duration::from_millis(5)).with_sweep_threshold(100);
        for round in 0..5 {
            for i in 0..100 {
                throttle.record_failure(&format!("spray{}-{}@example.org", round, i));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        // Each round's records are stale by the time the next round crosses the threshold
        assert!(throttle.len() <= 200, "map grew to {}", throttle.len());
    }

    #[test]
    fn test_window_expiry_unlocks() {
        let throttle = LoginThrottle::new(1, Duration::from_millis(10));
        throttle.record_failure("ada@example.org");
        std::thread::sleep(Duration::from_millis(20));
        assert!(throttle.check("ada@example.org").is_ok());
    }
}
