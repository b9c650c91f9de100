//! CRM Trust Core - Rate Limiting
//!
//! Sliding-window admission control per (identifier, action class):
//! - Per-class limits with an explicit conservative default
//! - Atomic check-and-record delegated to a [`CounterStore`]
//! - Per-class fail-open / fail-closed policy on store failure
//! - Monthly AI quota per tenant, sized by plan
//!
//! # Sliding window
//!
//! ```text
//!   now - window                                   now
//!        │◀──────────────── window ─────────────────▶│
//!   ──x──┼────x──────x───────────x─────────x─────────┼──▶ t
//!     ▲  │  oldest                                   │
//!  expired                  count = 4, limit = 5 → admit, record now
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classes;
pub mod identifier;
pub mod limiter;
pub mod quota;
pub mod store;

#[cfg(test)]
mod testing;

pub use classes::{ActionClass, ActionLimit, FailurePolicy, LimitTable, MAX_WINDOW_MS};
pub use identifier::{client_identifier, UNATTRIBUTED};
pub use limiter::{DecisionSource, RateLimitDecision, RateLimitStatus, RateLimiter};
pub use quota::{Plan, QuotaDecision, TenantQuota};
pub use store::{CounterOutcome, CounterStore, CounterStoreError, MemoryCounterStore, WindowOutcome, WindowSnapshot};

use thiserror::Error;

/// Rate limiting errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// A class limit is unusable
    #[error("invalid limit for class {class}: {reason}")]
    InvalidLimit {
        /// Action class name
        class: String,
        /// What is wrong
        reason: String,
    },

    /// Plan name not recognised
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// In-process store selected for production without opt-in
    #[error("in-process counter store is not allowed in production")]
    InProcessStoreInProduction,

    /// Counter store failed
    #[error("counter store error: {0}")]
    Store(#[from] CounterStoreError),

    /// Counter store did not answer in time
    #[error("counter store timed out after {0} ms")]
    StoreTimeout(u64),
}
