//! Tenant scope guard
//!
//! The tenant assertion runs after every fetch, including fetches that
//! already filtered by tenant in their query.

use crm_authz::{AuditAction, AuditDecision, AuditEvent, AuditSink};
use crm_common::{Identity, TenantId, TrustError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Entity that belongs to exactly one tenant
pub trait TenantOwned {
    /// Owning tenant
    fn tenant_id(&self) -> &TenantId;
}

/// Scoped access errors
#[derive(Error, Debug)]
pub enum ScopeError<E: std::error::Error + 'static> {
    /// Absent, or owned by another tenant
    #[error("not found")]
    NotFound,

    /// Fetch failed
    #[error("storage error: {0}")]
    Store(#[source] E),
}

impl<E: std::error::Error + 'static> ScopeError<E> {
    /// Whether this is a (possibly disguised) not-found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl<E: std::error::Error + 'static> From<ScopeError<E>> for TrustError {
    fn from(err: ScopeError<E>) -> Self {
        match err {
            ScopeError::NotFound => TrustError::NotFound,
            ScopeError::Store(e) => TrustError::Internal(e.to_string()),
        }
    }
}

/// Tenant scope guard
pub struct TenantScopeGuard {
    audit: Arc<dyn AuditSink>,
}

impl TenantScopeGuard {
    /// Create a guard reporting cross-tenant hits to `audit`
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Run `fetch` and return its entity only if it belongs to the caller's tenant.
    ///
    /// `kind` names the entity type in security records, e.g. `"contact"`.
    pub async fn scoped_lookup<T, E, Fut>(&self, identity: &Identity, kind: &str, fetch: Fut) -> Result<T, ScopeError<E>>
    where
        T: TenantOwned,
        E: std::error::Error + 'static,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match fetch.await.map_err(ScopeError::Store)? {
            Some(entity) => self.assert_owned(identity, kind, entity),
            None => {
                debug!(tenant_id = %identity.tenant_id(), kind, "entity not found");
                Err(ScopeError::NotFound)
            }
        }
    }

    /// Run `fetch` and keep only rows of the caller's tenant.
    ///
    /// Foreign rows are dropped and reported as a single security event.
    pub async fn scoped_list<T, E, Fut>(&self, identity: &Identity, kind: &str, fetch: Fut) -> Result<Vec<T>, ScopeError<E>>
    where
        T: TenantOwned,
        E: std::error::Error + 'static,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let rows = fetch.await.map_err(ScopeError::Store)?;
        let total = rows.len();
        let owned: Vec<T> = rows
            .into_iter()
            .filter(|row| row.tenant_id() == identity.tenant_id())
            .collect();

        let foreign = total - owned.len();
        if foreign > 0 {
            self.report_cross_tenant(identity, kind, foreign);
        }
        Ok(owned)
    }

    /// Check an entity the caller already holds
    pub fn assert_owned<T, E>(&self, identity: &Identity, kind: &str, entity: T) -> Result<T, ScopeError<E>>
    where
        T: TenantOwned,
        E: std::error::Error + 'static,
    {
        if entity.tenant_id() == identity.tenant_id() {
            return Ok(entity);
        }
        self.report_cross_tenant(identity, kind, 1);
        Err(ScopeError::NotFound)
    }

    fn report_cross_tenant(&self, identity: &Identity, kind: &str, rows: usize) {
        warn!(
            target: "security",
            user_id = %identity.id(),
            role = %identity.role(),
            tenant_id = %identity.tenant_id(),
            kind,
            rows,
            "cross-tenant access attempt"
        );
        self.audit.record(
            AuditEvent::new(identity, AuditAction::CrossTenantAccess, kind, AuditDecision::Denied).with_resource(kind),
        );
    }
}
