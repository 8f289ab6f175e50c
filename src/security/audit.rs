//! Audit trail.
//!
//! `AuditEvent` carries the fields the compliance record needs (actor,
//! action, resource, before/after, client, purpose, justification).
//! `AuditLogger` hands events to an `AuditSink` collaborator. A sink failure
//! is logged, counted and swallowed: the audit path must never fail the
//! request it describes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::auth::session::ClientMetadata;
use crate::auth::store::{with_timeout, StoreError};
use crate::telemetry::{record_audit_sink_failure, SecurityEvent};

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub enum AuditSeverity {
    Info = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "INFO"),
            AuditSeverity::Warning => write!(f, "WARNING"),
            AuditSeverity::Error => write!(f, "ERROR"),
            AuditSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Audit event categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataAccess,
    SafetyAnalysis,
    PhiDisclosure,
    Configuration,
    System,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditCategory::Authentication => write!(f, "AUTHENTICATION"),
            AuditCategory::Authorization => write!(f, "AUTHORIZATION"),
            AuditCategory::DataAccess => write!(f, "DATA_ACCESS"),
            AuditCategory::SafetyAnalysis => write!(f, "SAFETY_ANALYSIS"),
            AuditCategory::PhiDisclosure => write!(f, "PHI_DISCLOSURE"),
            AuditCategory::Configuration => write!(f, "CONFIGURATION"),
            AuditCategory::System => write!(f, "SYSTEM"),
        }
    }
}

/// Audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    /// What was attempted, e.g. `login` or `analyze_combined`.
    pub action: String,
    pub message: String,
    pub actor_id: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub purpose: Option<String>,
    pub justification: Option<String>,
    /// Internal detail such as a login failure reason. Never client-visible.
    pub metadata: HashMap<String, String>,
    pub correlation_id: Option<String>,
    pub success: bool,
}

impl AuditEvent {
    pub fn builder() -> AuditEventBuilder {
        AuditEventBuilder::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_log_string(&self) -> String {
        format!(
            "[{}] {} [{}] {} - {} (actor={:?}, resource={}:{:?}, success={})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.severity,
            self.category,
            self.action,
            self.message,
            self.actor_id,
            self.resource_type,
            self.resource_id,
            self.success
        )
    }
}

#[derive(Debug, Default)]
pub struct AuditEventBuilder {
    severity: Option<AuditSeverity>,
    category: Option<AuditCategory>,
    action: Option<String>,
    message: Option<String>,
    actor_id: Option<String>,
    resource_type: Option<String>,
    resource_id: Option<String>,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    client: ClientMetadata,
    purpose: Option<String>,
    justification: Option<String>,
    metadata: HashMap<String, String>,
    correlation_id: Option<String>,
    success: bool,
}

impl AuditEventBuilder {
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = resource_id;
        self
    }

    pub fn before(mut self, state: serde_json::Value) -> Self {
        self.before = Some(state);
        self
    }

    pub fn after(mut self, state: serde_json::Value) -> Self {
        self.after = Some(state);
        self
    }

    pub fn client(mut self, client: &ClientMetadata) -> Self {
        self.client = client.clone();
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn build(self) -> Result<AuditEvent, &'static str> {
        Ok(AuditEvent {
            id: generate_event_id(),
            timestamp: Utc::now(),
            severity: self.severity.ok_or("severity is required")?,
            category: self.category.ok_or("category is required")?,
            action: self.action.ok_or("action is required")?,
            message: self.message.ok_or("message is required")?,
            resource_type: self.resource_type.ok_or("resource_type is required")?,
            actor_id: self.actor_id,
            resource_id: self.resource_id,
            before: self.before,
            after: self.after,
            source_ip: self.client.ip,
            user_agent: self.client.user_agent,
            purpose: self.purpose,
            justification: self.justification,
            metadata: self.metadata,
            correlation_id: self.correlation_id,
            success: self.success,
        })
    }
}

fn generate_event_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes[..]);
    hex::encode(bytes)
}

/// Outbound audit collaborator.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_event(&self, event: &AuditEvent) -> Result<(), StoreError>;
}

/// In-memory sink with a bounded buffer, queryable for reports and tests.
pub struct MemoryAuditSink {
    max_events: usize,
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            events: RwLock::new(Vec::new()),
        }
    }

    pub async fn get_events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn get_events_by_category(&self, category: AuditCategory) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    pub async fn get_events_by_action(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        let events = self.events.read().await;
        serde_json::to_string_pretty(&*events)
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        events.push(event.clone());

        if events.len() > self.max_events {
            let excess = events.len() - self.max_events;
            events.drain(0..excess);
        }
        Ok(())
    }
}

/// Front door for audit writes.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Deliver one event. Returns whether the sink accepted it.
    pub async fn record(&self, event: AuditEvent) -> bool {
        tracing::debug!(
            audit_id = %event.id,
            action = %event.action,
            category = %event.category,
            success = event.success,
            "Audit event"
        );

        match with_timeout(self.timeout, self.sink.log_event(&event)).await {
            Ok(()) => true,
            Err(e) => {
                let error = e.to_string();
                record_audit_sink_failure();
                crate::security_log!(
                    SecurityEvent::AuditSinkFailure,
                    "Audit record was not persisted",
                    "audit_id" => event.id.as_str(),
                    "action" => event.action.as_str(),
                    "error" => error.as_str()
                );
                false
            }
        }
    }

    /// Build and record; a builder error is logged like a sink failure.
    pub async fn record_built(&self, builder: AuditEventBuilder) -> bool {
        match builder.build() {
            Ok(event) => self.record(event).await,
            Err(missing) => {
                record_audit_sink_failure();
                tracing::error!(reason = missing, "Audit event could not be built");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn log_event(&self, _event: &AuditEvent) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("audit db offline".into()))
        }
    }

    fn event(action: &str) -> AuditEvent {
        AuditEvent::builder()
            .severity(AuditSeverity::Info)
            .category(AuditCategory::Authentication)
            .action(action)
            .message("User logged in")
            .resource("session", Some("s-1".into()))
            .actor("user123")
            .success(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_audit_severity_ordering() {
        assert!(AuditSeverity::Critical > AuditSeverity::Error);
        assert!(AuditSeverity::Error > AuditSeverity::Warning);
        assert!(AuditSeverity::Warning > AuditSeverity::Info);
    }

    #[test]
    fn test_builder_fields() {
        let client = ClientMetadata {
            ip: Some("10.0.0.5".into()),
            user_agent: Some("tablet-app/2.1".into()),
        };
        let event = AuditEvent::builder()
            .severity(AuditSeverity::Warning)
            .category(AuditCategory::DataAccess)
            .action("read_resident")
            .message("Chart viewed")
            .resource("resident", Some("r-42".into()))
            .client(&client)
            .purpose("care_planning")
            .justification("weekly review")
            .before(serde_json::json!({"consent": false}))
            .after(serde_json::json!({"consent": true}))
            .build()
            .unwrap();

        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(event.user_agent.as_deref(), Some("tablet-app/2.1"));
        assert_eq!(event.purpose.as_deref(), Some("care_planning"));
        assert_eq!(event.after, Some(serde_json::json!({"consent": true})));
        assert!(event.to_log_string().contains("resident"));
    }

    #[test]
    fn test_builder_missing_fields() {
        let result = AuditEvent::builder().severity(AuditSeverity::Info).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_event_ids_unique_hex() {
        let id1 = generate_event_id();
        let id2 = generate_event_id();
        assert_eq!(id1.len(), 32);
        assert_ne!(id1, id2);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_memory_sink_bounded() {
        let sink = MemoryAuditSink::new(5);
        for i in 0..10 {
            sink.log_event(&event(&format!("login_{}", i))).await.unwrap();
        }
        assert_eq!(sink.event_count().await, 5);
        assert_eq!(sink.get_events().await[0].action, "login_5");
    }

    #[tokio::test]
    async fn test_logger_delivers() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = AuditLogger::new(sink.clone(), Duration::from_secs(1));

        assert!(logger.record(event("login")).await);
        assert_eq!(sink.get_events_by_action("login").await.len(), 1);
        assert!(sink.export_json().await.unwrap().contains("\"login\""));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let logger = AuditLogger::new(Arc::new(FailingSink), Duration::from_secs(1));
        assert!(!logger.record(event("login")).await);
    }
}
