//! Audit trail and PHI field encryption.

pub mod audit;
pub mod encryption;

pub use audit::{
    AuditCategory, AuditEvent, AuditEventBuilder, AuditLogger, AuditSeverity, AuditSink,
    MemoryAuditSink,
};
pub use encryption::{EncryptionError, PhiCipher, PhiKey};
