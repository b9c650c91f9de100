//! CRM Trust Core - Shared types
//!
//! Types every trust component agrees on:
//! - Identity, Role and tenant/user identifiers
//! - The boundary error taxonomy
//! - The response contract handed to the HTTP layer
//! - An injectable millisecond clock
//!
//! # Request flow
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐   ┌─────────────┐
//! │   Identity   │──▶│ Authorization │──▶│ Tenant Scope │──▶│   Handler   │
//! │   Resolver   │   │    Engine     │   │    Guard     │   │  (external) │
//! └──────────────┘   └───────────────┘   └──────────────┘   └──────┬──────┘
//!                                                                  │
//!        ┌──────────────┐                                 ┌────────▼────────┐
//!        │ Rate Limiter │ (independent gate)              │ Field Encryptor │
//!        └──────────────┘                                 └─────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod identity;
pub mod response;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Requirement, TrustError, TrustResult};
pub use identity::{Environment, Identity, IdentityClaims, IdentityError, Role, TenantId, UserId};
pub use response::{BoundaryResponse, ErrorBody};
