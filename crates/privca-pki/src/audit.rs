//! 审计事件
//!
//! Engine operations report to an [`AuditSink`]. A failing sink is logged
//! and never fails the operation that emitted the event.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{error::Result, logging::AUDIT_TARGET};

/// 审计动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CaInitialized,
    CaSelfSigned,
    CaCertificateUploaded,
    CaDeleted,
    CertificateIssued,
    CertificateRevoked,
    CrlGenerated,
    CertificateValidated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaInitialized => "ca_initialized",
            Self::CaSelfSigned => "ca_self_signed",
            Self::CaCertificateUploaded => "ca_certificate_uploaded",
            Self::CaDeleted => "ca_deleted",
            Self::CertificateIssued => "certificate_issued",
            Self::CertificateRevoked => "certificate_revoked",
            Self::CrlGenerated => "crl_generated",
            Self::CertificateValidated => "certificate_validated",
        }
    }
}

/// 审计事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor: String,
    pub description: String,
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            action,
            actor: actor.into(),
            description: description.into(),
            metadata,
            at: OffsetDateTime::now_utc(),
        }
    }
}

/// 审计接收端
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Hand an event to the sink, logging rather than propagating failures
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(e) = sink.record(&event) {
        tracing::warn!(action = event.action.as_str(), error = %e, "Audit sink rejected event");
    }
}

/// Writes events as structured `tracing` records under `privca::audit`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        tracing::info!(
            target: AUDIT_TARGET,
            action = event.action.as_str(),
            actor = %event.actor,
            metadata = %metadata,
            "{}",
            event.description
        );
        Ok(())
    }
}

/// Keeps events in memory; for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().iter().map(|event| event.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::PkiError;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record(&self, _event: &AuditEvent) -> Result<()> {
            Err(PkiError::AuditError("disk full".to_string()))
        }
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        emit(
            &sink,
            AuditEvent::new(
                AuditAction::CertificateRevoked,
                "alice",
                "Revoked 0a1b",
                json!({ "serial": "0a1b" }),
            ),
        );
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "alice");
        assert_eq!(events[0].metadata["serial"], "0a1b");
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        emit(
            &FailingSink,
            AuditEvent::new(AuditAction::CaDeleted, "bob", "Deleted", json!({})),
        );
    }

    #[test]
    fn test_tracing_sink() {
        TracingAuditSink
            .record(&AuditEvent::new(
                AuditAction::CrlGenerated,
                "system",
                "CRL 1",
                json!({ "crl_number": 1 }),
            ))
            .unwrap();
    }

    #[test]
    fn test_action_serde_name() {
        assert_eq!(
            serde_json::to_string(&AuditAction::CaSelfSigned).unwrap(),
            format!("\"{}\"", AuditAction::CaSelfSigned.as_str())
        );
    }
}
