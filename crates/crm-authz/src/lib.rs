//! CRM Trust Core - Authorization
//!
//! Role-based, default-deny authorization for the CRM:
//! - Static role → permission table built from an explicit matrix
//! - Stateless checks over a validated identity
//! - Audit trail of denials in production
//!
//! # Check flow
//!
//! ```text
//! ┌──────────────┐  claims   ┌──────────────┐  Identity  ┌────────────────┐
//! │   Identity   │──────────▶│   resolve()  │───────────▶│ check_*()      │
//! │   Resolver   │           │  (validate)  │            │ table lookup   │
//! └──────────────┘           └──────┬───────┘            └───────┬────────┘
//!                                   │ absent / invalid           │ denied
//!                                   ▼                            ▼
//!                             401 / 403                   ┌─────────────┐
//!                                                         │ Audit Sink  │
//!                                                         └─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod engine;
pub mod permissions;
pub mod resolver;

pub use audit::{AuditAction, AuditDecision, AuditEvent, AuditSink, ChannelAuditSink, MemoryAuditSink, TracingAuditSink};
pub use engine::{AuthorizationEngine, Decision, Denial};
pub use permissions::{Permission, RolePermissionTable, DEFAULT_MATRIX};
pub use resolver::{IdentityResolver, StaticIdentityResolver};

use thiserror::Error;

/// Authorization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Token is not a known permission
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    /// Matrix lists a permission twice
    #[error("permission listed twice in matrix: {0}")]
    DuplicatePermission(String),

    /// Matrix omits a permission
    #[error("permission missing from matrix: {0}")]
    MissingPermission(String),

    /// Identity collaborator failed
    #[error("identity resolver failed: {0}")]
    Resolver(String),
}
