//! Audit Trail
//!
//! Security-relevant decisions are handed to an [`AuditSink`]. Sinks are
//! fire-and-forget: `record` never blocks and never fails the request.

use chrono::{DateTime, Utc};
use crm_common::{Identity, Role, TenantId, UserId};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// Audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Event id
    pub id: uuid::Uuid,
    /// When the decision was taken
    pub timestamp: DateTime<Utc>,
    /// Acting user
    pub user_id: UserId,
    /// Acting role
    pub role: Role,
    /// Tenant of the acting identity
    pub tenant_id: TenantId,
    /// What kind of event this is
    pub action: AuditAction,
    /// Capability that was required, e.g. a permission token or role list
    pub requirement: String,
    /// Outcome
    pub decision: AuditDecision,
    /// Resource involved, when known
    pub resource: Option<String>,
}

impl AuditEvent {
    /// New event stamped now
    pub fn new(
        identity: &Identity,
        action: AuditAction,
        requirement: impl Into<String>,
        decision: AuditDecision,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: identity.id().clone(),
            role: identity.role(),
            tenant_id: identity.tenant_id().clone(),
            action,
            requirement: requirement.into(),
            decision,
            resource: None,
        }
    }

    /// Attach the resource involved
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Audit event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Permission check
    PermissionCheck,
    /// Role allow-list check
    RoleCheck,
    /// Entity of another tenant was returned to this identity's request
    CrossTenantAccess,
}

/// Audit decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    /// Capability granted
    Allowed,
    /// Capability refused
    Denied,
}

/// Audit sink collaborator
pub trait AuditSink: Send + Sync {
    /// Record an event. Must not block.
    fn record(&self, event: AuditEvent);
}

/// Emits events as structured `tracing` records on the `security` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::warn!(
            target: "security",
            event_id = %event.id,
            user_id = %event.user_id,
            role = %event.role,
            tenant_id = %event.tenant_id,
            action = ?event.action,
            requirement = %event.requirement,
            decision = ?event.decision,
            resource = event.resource.as_deref().unwrap_or("-"),
            timestamp = %event.timestamp.to_rfc3339(),
            "audit event"
        );
    }
}

/// Forwards events into a bounded channel; drops when the consumer lags
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Create the sink and the receiving end for the writer task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(target: "security", error = %e, "audit event dropped");
        }
    }
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new(UserId::new("u-1"), Role::User, TenantId::new("t-1"))
    }

    #[test]
    fn test_event_carries_identity() {
        let event = AuditEvent::new(&identity(), AuditAction::PermissionCheck, "delete_contacts", AuditDecision::Denied)
            .with_resource("contact:42");
        assert_eq!(event.user_id.as_str(), "u-1");
        assert_eq!(event.role, Role::User);
        assert_eq!(event.resource.as_deref(), Some("contact:42"));
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(AuditEvent::new(&identity(), AuditAction::RoleCheck, "OWNER", AuditDecision::Denied));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].action, AuditAction::RoleCheck);
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelAuditSink::new(1);
        let event = AuditEvent::new(&identity(), AuditAction::PermissionCheck, "x", AuditDecision::Denied);

        sink.record(event.clone());
        sink.record(event.clone());

        assert_eq!(rx.recv().await.unwrap().id, event.id);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let event = AuditEvent::new(&identity(), AuditAction::CrossTenantAccess, "contact", AuditDecision::Denied);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "cross_tenant_access");
        assert_eq!(json["role"], "USER");
    }
}
