//! Error taxonomy for the trust core
//!
//! Components return tagged outcomes. They are converted into [`TrustError`]
//! only at the outermost boundary, and from there into a [`BoundaryResponse`].

use crate::identity::Role;
use crate::response::{BoundaryResponse, ErrorBody};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// What an authorization check required
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// A single permission
    Permission(String),
    /// At least one of the permissions
    AnyOf(Vec<String>),
    /// Every one of the permissions
    AllOf(Vec<String>),
    /// One of an explicit list of roles
    Roles(Vec<Role>),
    /// A recognizable role at all
    ValidRole,
}

/// Boundary error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// No identity for the request
    #[error("authentication required")]
    Unauthenticated,

    /// Identity lacks the capability
    #[error("permission denied")]
    Forbidden {
        /// What was required
        requirement: Requirement,
        /// Role of the caller, if it could be determined
        current_role: Option<Role>,
    },

    /// Entity absent, or owned by another tenant
    #[error("not found")]
    NotFound,

    /// Admission refused by the rate limiter
    #[error("rate limit exceeded")]
    RateLimited {
        /// Configured limit for the action class
        limit: u32,
        /// When capacity returns
        reset_at: DateTime<Utc>,
        /// Whole seconds until `reset_at`
        retry_after_secs: u64,
    },

    /// Stored ciphertext could not be authenticated
    #[error("decryption failed")]
    DecryptionFailure,

    /// Fatal startup misconfiguration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Collaborator failure surfaced as a generic server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for boundary code
pub type TrustResult<T> = Result<T, TrustError>;

impl TrustError {
    /// HTTP-equivalent status code
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound => 404,
            Self::RateLimited { .. } => 429,
            Self::DecryptionFailure | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Structured, non-leaking response for the calling layer
    pub fn into_response(self) -> BoundaryResponse {
        let status = self.status();
        match self {
            Self::Unauthenticated => BoundaryResponse::new(
                status,
                ErrorBody::new("Authentication required", "You must be signed in to access this resource"),
            ),
            Self::Forbidden { requirement, current_role } => {
                BoundaryResponse::new(status, forbidden_body(requirement, current_role))
            }
            Self::NotFound => BoundaryResponse::new(
                status,
                ErrorBody::new("Not found", "The requested resource does not exist"),
            ),
            Self::RateLimited { limit, reset_at, retry_after_secs } => {
                let mut body = ErrorBody::new(
                    "Too many requests",
                    format!("Too many attempts. Try again in {}.", human_delay(retry_after_secs)),
                );
                body.reset_at = Some(reset_at);
                BoundaryResponse::new(status, body)
                    .with_header("X-RateLimit-Limit", limit.to_string())
                    .with_header("X-RateLimit-Remaining", "0")
                    .with_header("X-RateLimit-Reset", reset_at.timestamp().to_string())
                    .with_header("Retry-After", retry_after_secs.to_string())
            }
            Self::DecryptionFailure | Self::Configuration(_) | Self::Internal(_) => BoundaryResponse::new(
                status,
                ErrorBody::new("Internal error", "The request could not be completed"),
            ),
        }
    }
}

fn forbidden_body(requirement: Requirement, current_role: Option<Role>) -> ErrorBody {
    let mut body = match requirement {
        Requirement::Permission(p) => {
            let mut body = ErrorBody::new(
                "Permission denied",
                format!("You do not have the required permission: {}", p),
            );
            body.required_permission = Some(p);
            body
        }
        Requirement::AnyOf(ps) => {
            let mut body = ErrorBody::new("Permission denied", "You have none of the required permissions");
            body.required_permissions = Some(ps);
            body
        }
        Requirement::AllOf(ps) => {
            let mut body = ErrorBody::new("Permission denied", "You do not have all of the required permissions");
            body.required_permissions = Some(ps);
            body
        }
        Requirement::Roles(roles) => {
            let names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
            let mut body = ErrorBody::new(
                "Access denied",
                format!("This action is reserved for roles: {}", names.join(", ")),
            );
            body.required_roles = Some(names);
            body
        }
        Requirement::ValidRole => ErrorBody::new("Invalid user role", "Your user role is invalid"),
    };
    body.current_role = current_role.map(|r| r.as_str().to_string());
    body
}

fn human_delay(secs: u64) -> String {
    match secs {
        0 | 1 => "1 second".to_string(),
        s if s < 60 => format!("{} seconds", s),
        s if s < 120 => "1 minute".to_string(),
        s => format!("{} minutes", s.div_ceil(60)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TrustError::Unauthenticated.status(), 401);
        assert_eq!(
            TrustError::Forbidden { requirement: Requirement::ValidRole, current_role: None }.status(),
            403
        );
        assert_eq!(TrustError::NotFound.status(), 404);
        assert_eq!(TrustError::Configuration("x".into()).status(), 500);
    }

    #[test]
    fn test_forbidden_body_names_permission_and_role() {
        let resp = TrustError::Forbidden {
            requirement: Requirement::Permission("delete_contacts".into()),
            current_role: Some(Role::User),
        }
        .into_response();

        assert_eq!(resp.status, 403);
        assert_eq!(resp.body.required_permission.as_deref(), Some("delete_contacts"));
        assert_eq!(resp.body.current_role.as_deref(), Some("USER"));
    }

    #[test]
    fn test_rate_limited_response_has_headers() {
        let reset_at = DateTime::<Utc>::from_timestamp(1_700_000_060, 0).unwrap();
        let resp = TrustError::RateLimited { limit: 5, reset_at, retry_after_secs: 42 }.into_response();

        assert_eq!(resp.status, 429);
        assert_eq!(resp.header("Retry-After"), Some("42"));
        assert_eq!(resp.header("X-RateLimit-Remaining"), Some("0"));
        assert_eq!(resp.header("X-RateLimit-Reset"), Some("1700000060"));
        assert!(resp.body.message.contains("42 seconds"));
        assert_eq!(resp.body.reset_at, Some(reset_at));
    }

    #[test]
    fn test_internal_errors_do_not_leak_detail() {
        let resp = TrustError::Internal("db password wrong".into()).into_response();
        assert!(!resp.body.message.contains("password"));
    }

    #[test]
    fn test_human_delay() {
        assert_eq!(human_delay(0), "1 second");
        assert_eq!(human_delay(30), "30 seconds");
        assert_eq!(human_delay(60), "1 minute");
        assert_eq!(human_delay(3600), "60 minutes");
        assert_eq!(human_delay(3601), "61 minutes");
    }
}
