//! Identity resolution port
//!
//! The session layer owns authentication. This core only asks it who the
//! caller is, once per request.

use crate::AuthzError;
use async_trait::async_trait;
use crm_common::IdentityClaims;

/// Identity collaborator
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Claims of the current request, or `None` when unauthenticated
    async fn resolve(&self) -> Result<Option<IdentityClaims>, AuthzError>;
}

/// Resolver over claims that were already extracted
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    claims: Option<IdentityClaims>,
}

impl StaticIdentityResolver {
    /// Resolver returning `claims`
    pub fn new(claims: Option<IdentityClaims>) -> Self {
        Self { claims }
    }

    /// Resolver for an unauthenticated request
    pub fn anonymous() -> Self {
        Self { claims: None }
    }

    /// Resolver for given raw parts
    pub fn with_claims(id: &str, role: &str, tenant_id: &str) -> Self {
        Self {
            claims: Some(IdentityClaims {
                id: id.to_string(),
                role: Some(role.to_string()),
                tenant_id: Some(tenant_id.to_string()),
            }),
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self) -> Result<Option<IdentityClaims>, AuthzError> {
        Ok(self.claims.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver_returns_claims() {
        let resolver = StaticIdentityResolver::with_claims("u-1", "OWNER", "t-1");
        let claims = tokio_test::block_on(resolver.resolve()).unwrap().unwrap();
        assert_eq!(claims.id, "u-1");
        assert_eq!(claims.role.as_deref(), Some("OWNER"));
        assert_eq!(claims.tenant_id.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_anonymous_resolver() {
        let resolver = StaticIdentityResolver::anonymous();
        assert!(tokio_test::block_on(resolver.resolve()).unwrap().is_none());
    }
}
