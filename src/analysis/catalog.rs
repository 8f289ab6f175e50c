//! Pattern catalog shared by every analyzer.
//!
//! Compiled once at startup and handed out behind an `Arc`. Nothing in here
//! is mutable after `build()` returns, so analyzers read it concurrently
//! without locking.

use std::sync::Arc;

use super::crisis::CrisisPatterns;
use super::emotion::EmotionPatterns;
use super::error::AnalysisError;
use super::phi::PhiPatterns;

/// Every compiled pattern table used by the analyzers.
pub struct PatternCatalog {
    pub phi: PhiPatterns,
    pub emotion: EmotionPatterns,
    pub crisis: CrisisPatterns,
}

impl PatternCatalog {
    /// Compile all tables. A pattern that fails to compile fails startup.
    pub fn build() -> Result<Self, AnalysisError> {
        let catalog = Self {
            phi: PhiPatterns::compile()?,
            emotion: EmotionPatterns::compile()?,
            crisis: CrisisPatterns::compile()?,
        };

        tracing::debug!(
            phi_patterns = catalog.phi.len(),
            emotion_patterns = catalog.emotion.len(),
            crisis_patterns = catalog.crisis.len(),
            "Pattern catalog compiled"
        );

        Ok(catalog)
    }

    pub fn shared() -> Result<Arc<Self>, AnalysisError> {
        Self::build().map(Arc::new)
    }
}

impl std::fmt::Debug for PatternCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternCatalog")
            .field("phi", &self.phi.len())
            .field("emotion", &self.emotion.len())
            .field("crisis", &self.crisis.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_compiles() {
        let catalog = PatternCatalog::build().unwrap();
        assert!(!catalog.phi.is_empty());
        assert!(!catalog.emotion.is_empty());
        assert!(!catalog.crisis.is_empty());
    }

    #[test]
    fn test_shared_catalog_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PatternCatalog>();
        let shared = PatternCatalog::shared().unwrap();
        let clone = Arc::clone(&shared);
        assert_eq!(Arc::strong_count(&clone), 2);
    }
}
