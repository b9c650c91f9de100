//! CRM Trust Core
//!
//! Loads configuration, builds every trust component once and validates the
//! deployment before the first request is served.
//!
//! # Assembly
//!
//! ```text
//!  crm-trust.toml ─┐
//!  CRM_TRUST__*  ──┼──▶ TrustConfig ──validate──▶ TrustCore
//!  ENCRYPTION_KEY ─┘                                  │
//!             ┌──────────────────┬────────────────────┼───────────────────┐
//!             ▼                  ▼                    ▼                   ▼
//!       Authorization       Tenant Scope         Rate Limiter       Field Encryptor
//!          Engine              Guard            (CounterStore)      (MasterSecret)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod settings;
pub mod trust;

pub use settings::{ConfigError, TrustConfig};
pub use trust::{field_encryptor, limit_table, TrustCore};

pub use crm_authz as authz;
pub use crm_common as common;
pub use crm_crypto as crypto;
pub use crm_ratelimit as ratelimit;
pub use crm_tenant as tenant;
