use leadflow_core::audit::{AuditEvent, AuditSink};
use tracing::info;

/// Emits audit events as structured log lines. The production sink; tests
/// use `InMemoryAuditSink` from the core crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            subject_id = event.subject_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            instance_id = event.instance_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            actor = %event.actor,
            outcome = ?event.outcome,
            "audit event"
        );
    }
}
