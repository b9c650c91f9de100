//! CRM Trust Core - Tenant Isolation
//!
//! Wraps entity reads so an identity only ever observes rows of its own
//! tenant. A foreign row is reported to the caller exactly like a missing
//! one; only the security log and the audit sink can tell them apart.
//!
//! ```text
//! ┌──────────┐  fetch   ┌────────────────┐  same tenant   ┌─────────┐
//! │ Handler  │─────────▶│  Scope Guard   │───────────────▶│ Entity  │
//! └──────────┘          │ assert tenant  │                └─────────┘
//!                       └───────┬────────┘
//!                               │ other tenant / absent
//!                               ▼
//!                          NotFound (404)  ──▶ security log + audit
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod guard;

pub use guard::{ScopeError, TenantOwned, TenantScopeGuard};
