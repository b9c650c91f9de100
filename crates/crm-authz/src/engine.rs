//! Authorization Engine
//!
//! Stateless, default-deny capability checks over a validated [`Identity`].
//! Every check is a pure function of (identity, requested capability); the
//! only side effect is an audit record on denial in production.

use crate::audit::{AuditAction, AuditDecision, AuditEvent, AuditSink};
use crate::permissions::{Permission, RolePermissionTable};
use crate::resolver::IdentityResolver;
use crm_common::error::Requirement;
use crm_common::{BoundaryResponse, Environment, Identity, IdentityError, Role, TrustError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Caller may proceed
    Allowed,
    /// Caller must be refused
    Denied(Denial),
}

/// Why a check denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No usable identity (401)
    Unauthenticated,
    /// Identity lacks the capability (403)
    Forbidden {
        /// What was required
        requirement: Requirement,
        /// Caller's role, when known
        current_role: Option<Role>,
    },
}

impl Decision {
    /// Whether the caller may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert to a boundary result
    pub fn into_result(self) -> Result<(), TrustError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(denial) => Err(denial.into()),
        }
    }

    /// Response for a denial, `None` when allowed
    pub fn into_response(self) -> Option<BoundaryResponse> {
        self.into_result().err().map(TrustError::into_response)
    }
}

impl From<Denial> for TrustError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => TrustError::Unauthenticated,
            Denial::Forbidden { requirement, current_role } => TrustError::Forbidden { requirement, current_role },
        }
    }
}

/// Authorization engine
pub struct AuthorizationEngine {
    table: Arc<RolePermissionTable>,
    audit: Arc<dyn AuditSink>,
    environment: Environment,
    audited_allows: HashSet<Permission>,
    resolve_timeout: Duration,
}

impl AuthorizationEngine {
    /// Create an engine over a built table
    pub fn new(table: Arc<RolePermissionTable>, audit: Arc<dyn AuditSink>, environment: Environment) -> Self {
        Self {
            table,
            audit,
            environment,
            audited_allows: HashSet::new(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Bound on identity resolution
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Also audit successful checks of these permissions
    pub fn with_audited_allows(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.audited_allows.extend(permissions);
        self
    }

    /// Underlying table
    pub fn table(&self) -> &RolePermissionTable {
        &self.table
    }

    /// Pure table lookup
    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.table.has_permission(role, permission)
    }

    /// Pure table lookup over raw tokens
    pub fn has_permission_str(&self, role: &str, permission: &str) -> bool {
        self.table.has_permission_str(role, permission)
    }

    /// Permissions granted to a role
    pub fn role_permissions(&self, role: Role) -> Vec<Permission> {
        self.table.role_permissions(role)
    }

    /// Resolve and validate the current identity through the collaborator.
    ///
    /// Resolver failure, timeout, absent claims, or claims without a user or
    /// tenant all resolve to `Unauthenticated`. Claims with a missing or
    /// unrecognized role resolve to `Forbidden`.
    pub async fn resolve(&self, resolver: &dyn IdentityResolver) -> Result<Identity, Denial> {
        let claims = match tokio::time::timeout(self.resolve_timeout, resolver.resolve()).await {
            Ok(Ok(Some(claims))) => claims,
            Ok(Ok(None)) => return Err(Denial::Unauthenticated),
            Ok(Err(e)) => {
                warn!(error = %e, "identity resolution failed");
                return Err(Denial::Unauthenticated);
            }
            Err(_) => {
                warn!(timeout_ms = self.resolve_timeout.as_millis() as u64, "identity resolution timed out");
                return Err(Denial::Unauthenticated);
            }
        };

        let user_id = claims.id.clone();
        Identity::try_from(claims).map_err(|e| match e {
            IdentityError::MissingRole | IdentityError::UnknownRole(_) => {
                warn!(target: "security", user_id = %user_id, error = %e, "identity with invalid role");
                Denial::Forbidden { requirement: Requirement::ValidRole, current_role: None }
            }
            IdentityError::MissingUserId | IdentityError::MissingTenant => {
                debug!(error = %e, "incomplete identity claims");
                Denial::Unauthenticated
            }
        })
    }

    /// Resolve, then require authentication only
    pub async fn require_authenticated(&self, resolver: &dyn IdentityResolver) -> Decision {
        match self.resolve(resolver).await {
            Ok(identity) => self.check_authenticated(Some(&identity)),
            Err(denial) => Decision::Denied(denial),
        }
    }

    /// Resolve, then require a permission
    pub async fn require_permission(&self, resolver: &dyn IdentityResolver, permission: Permission) -> Decision {
        match self.resolve(resolver).await {
            Ok(identity) => self.check_permission(Some(&identity), permission),
            Err(denial) => Decision::Denied(denial),
        }
    }

    /// Resolve, then require at least one permission
    pub async fn require_any_permission(&self, resolver: &dyn IdentityResolver, permissions: &[Permission]) -> Decision {
        match self.resolve(resolver).await {
            Ok(identity) => self.check_any_permission(Some(&identity), permissions),
            Err(denial) => Decision::Denied(denial),
        }
    }

    /// Resolve, then require every permission
    pub async fn require_all_permissions(&self, resolver: &dyn IdentityResolver, permissions: &[Permission]) -> Decision {
        match self.resolve(resolver).await {
            Ok(identity) => self.check_all_permissions(Some(&identity), permissions),
            Err(denial) => Decision::Denied(denial),
        }
    }

    /// Resolve, then require one of the roles
    pub async fn require_role(&self, resolver: &dyn IdentityResolver, roles: &[Role]) -> Decision {
        match self.resolve(resolver).await {
            Ok(identity) => self.check_role(Some(&identity), roles),
            Err(denial) => Decision::Denied(denial),
        }
    }

    /// Authentication only
    pub fn check_authenticated(&self, identity: Option<&Identity>) -> Decision {
        match identity {
            Some(_) => Decision::Allowed,
            None => Decision::Denied(Denial::Unauthenticated),
        }
    }

    /// Single permission
    pub fn check_permission(&self, identity: Option<&Identity>, permission: Permission) -> Decision {
        let Some(identity) = identity else {
            return Decision::Denied(Denial::Unauthenticated);
        };

        if self.has_permission(identity.role(), permission) {
            if self.audited_allows.contains(&permission) {
                self.emit(identity, AuditAction::PermissionCheck, permission.as_str(), AuditDecision::Allowed);
            }
            return Decision::Allowed;
        }

        self.emit(identity, AuditAction::PermissionCheck, permission.as_str(), AuditDecision::Denied);
        Decision::Denied(Denial::Forbidden {
            requirement: Requirement::Permission(permission.as_str().to_string()),
            current_role: Some(identity.role()),
        })
    }

    /// At least one permission. An empty set denies.
    pub fn check_any_permission(&self, identity: Option<&Identity>, permissions: &[Permission]) -> Decision {
        let Some(identity) = identity else {
            return Decision::Denied(Denial::Unauthenticated);
        };

        if permissions.iter().any(|p| self.has_permission(identity.role(), *p)) {
            // Audit when an audited permission the role holds is in the set.
            if permissions
                .iter()
                .any(|p| self.audited_allows.contains(p) && self.has_permission(identity.role(), *p))
            {
                let requirement = format!("any:{}", tokens(permissions).join(","));
                self.emit(identity, AuditAction::PermissionCheck, requirement, AuditDecision::Allowed);
            }
            return Decision::Allowed;
        }

        let tokens = tokens(permissions);
        self.emit(identity, AuditAction::PermissionCheck, format!("any:{}", tokens.join(",")), AuditDecision::Denied);
        Decision::Denied(Denial::Forbidden {
            requirement: Requirement::AnyOf(tokens),
            current_role: Some(identity.role()),
        })
    }

    /// Every permission
    pub fn check_all_permissions(&self, identity: Option<&Identity>, permissions: &[Permission]) -> Decision {
        let Some(identity) = identity else {
            return Decision::Denied(Denial::Unauthenticated);
        };

        if permissions.iter().all(|p| self.has_permission(identity.role(), *p)) {
            if permissions.iter().any(|p| self.audited_allows.contains(p)) {
                let requirement = format!("all:{}", tokens(permissions).join(","));
                self.emit(identity, AuditAction::PermissionCheck, requirement, AuditDecision::Allowed);
            }
            return Decision::Allowed;
        }

        let tokens = tokens(permissions);
        self.emit(identity, AuditAction::PermissionCheck, format!("all:{}", tokens.join(",")), AuditDecision::Denied);
        Decision::Denied(Denial::Forbidden {
            requirement: Requirement::AllOf(tokens),
            current_role: Some(identity.role()),
        })
    }

    /// Explicit role allow-list, bypassing permission granularity
    pub fn check_role(&self, identity: Option<&Identity>, roles: &[Role]) -> Decision {
        let Some(identity) = identity else {
            return Decision::Denied(Denial::Unauthenticated);
        };

        if roles.contains(&identity.role()) {
            return Decision::Allowed;
        }

        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        self.emit(identity, AuditAction::RoleCheck, names.join(","), AuditDecision::Denied);
        Decision::Denied(Denial::Forbidden {
            requirement: Requirement::Roles(roles.to_vec()),
            current_role: Some(identity.role()),
        })
    }

    fn emit(&self, identity: &Identity, action: AuditAction, requirement: impl Into<String>, decision: AuditDecision) {
        let requirement = requirement.into();
        debug!(
            user_id = %identity.id(),
            role = %identity.role(),
            requirement = %requirement,
            ?decision,
            "authorization decision"
        );
        if self.environment.is_production() {
            self.audit.record(AuditEvent::new(identity, action, requirement, decision));
        }
    }
}

fn tokens(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::resolver::StaticIdentityResolver;
    use crate::AuthzError;
    use async_trait::async_trait;
    use crm_common::{IdentityClaims, TenantId, UserId};

    fn engine(environment: Environment) -> (AuthorizationEngine, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let engine = AuthorizationEngine::new(Arc::new(RolePermissionTable::default()), sink.clone(), environment);
        (engine, sink)
    }

    fn identity(role: Role) -> Identity {
        Identity::new(UserId::new("u-1"), role, TenantId::new("t-1"))
    }

    struct FailingResolver;

    #[async_trait]
    impl IdentityResolver for FailingResolver {
        async fn resolve(&self) -> Result<Option<IdentityClaims>, AuthzError> {
            Err(AuthzError::Resolver("session store down".into()))
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl IdentityResolver for SlowResolver {
        async fn resolve(&self) -> Result<Option<IdentityClaims>, AuthzError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_user_cannot_delete_contacts_owner_can() {
        let (engine, _) = engine(Environment::Production);

        let user = StaticIdentityResolver::with_claims("u-1", "USER", "t-1");
        let decision = engine.require_permission(&user, Permission::DeleteContacts).await;
        let response = decision.into_response().unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(response.body.required_permission.as_deref(), Some("delete_contacts"));
        assert_eq!(response.body.current_role.as_deref(), Some("USER"));

        let owner = StaticIdentityResolver::with_claims("u-2", "OWNER", "t-1");
        assert!(engine.require_permission(&owner, Permission::DeleteContacts).await.is_allowed());
    }

    #[tokio::test]
    async fn test_absent_identity_is_unauthenticated_for_every_permission() {
        let (engine, sink) = engine(Environment::Production);
        let anonymous = StaticIdentityResolver::anonymous();

        for permission in Permission::ALL {
            let decision = engine.require_permission(&anonymous, *permission).await;
            assert_eq!(decision, Decision::Denied(Denial::Unauthenticated));
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_role_is_forbidden() {
        let (engine, _) = engine(Environment::Production);
        let resolver = StaticIdentityResolver::with_claims("u-1", "ROOT", "t-1");

        let decision = engine.require_permission(&resolver, Permission::ViewDashboard).await;
        assert_eq!(
            decision,
            Decision::Denied(Denial::Forbidden { requirement: Requirement::ValidRole, current_role: None })
        );
    }

    #[tokio::test]
    async fn test_missing_tenant_is_unauthenticated() {
        let (engine, _) = engine(Environment::Production);
        let resolver = StaticIdentityResolver::new(Some(IdentityClaims {
            id: "u-1".into(),
            role: Some("OWNER".into()),
            tenant_id: None,
        }));
        assert_eq!(
            engine.require_authenticated(&resolver).await,
            Decision::Denied(Denial::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_resolver_failure_denies() {
        let (engine, _) = engine(Environment::Production);
        assert_eq!(
            engine.require_permission(&FailingResolver, Permission::ViewDashboard).await,
            Decision::Denied(Denial::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_resolver_timeout_denies() {
        let (engine, _) = engine(Environment::Production);
        let engine = engine.with_resolve_timeout(Duration::from_millis(50));
        assert_eq!(
            engine.require_authenticated(&SlowResolver).await,
            Decision::Denied(Denial::Unauthenticated)
        );
    }

    #[test]
    fn test_denial_audited_only_in_production() {
        let (prod, prod_sink) = engine(Environment::Production);
        let (dev, dev_sink) = engine(Environment::Development);
        let user = identity(Role::User);

        assert!(!prod.check_permission(Some(&user), Permission::DeleteInvoices).is_allowed());
        assert!(!dev.check_permission(Some(&user), Permission::DeleteInvoices).is_allowed());

        let events = prod_sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].requirement, "delete_invoices");
        assert_eq!(events[0].role, Role::User);
        assert_eq!(events[0].decision, AuditDecision::Denied);
        assert!(dev_sink.is_empty());
    }

    #[test]
    fn test_allow_is_silent_unless_configured() {
        let (engine, sink) = engine(Environment::Production);
        let engine = engine.with_audited_allows([Permission::DeleteInvoices]);
        let owner = identity(Role::Owner);

        assert!(engine.check_permission(Some(&owner), Permission::ViewInvoices).is_allowed());
        assert!(sink.is_empty());

        assert!(engine.check_permission(Some(&owner), Permission::DeleteInvoices).is_allowed());
        assert_eq!(sink.events()[0].decision, AuditDecision::Allowed);
    }

    #[test]
    fn test_audited_allow_through_any_and_all() {
        let (engine, sink) = engine(Environment::Production);
        let engine = engine.with_audited_allows([Permission::DeleteInvoices]);
        let owner = identity(Role::Owner);
        let user = identity(Role::User);

        // Allowed through a permission that is not audited.
        assert!(engine
            .check_any_permission(Some(&user), &[Permission::DeleteInvoices, Permission::ViewDashboard])
            .is_allowed());
        assert!(sink.is_empty());

        assert!(engine
            .check_any_permission(Some(&owner), &[Permission::ViewDashboard, Permission::DeleteInvoices])
            .is_allowed());
        assert!(engine
            .check_all_permissions(Some(&owner), &[Permission::ViewInvoices, Permission::DeleteInvoices])
            .is_allowed());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].requirement, "any:view_dashboard,delete_invoices");
        assert_eq!(events[1].requirement, "all:view_invoices,delete_invoices");
        assert!(events.iter().all(|e| e.decision == AuditDecision::Allowed));
    }

    #[test]
    fn test_any_and_all() {
        let (engine, _) = engine(Environment::Test);
        let accountant = identity(Role::Accountant);

        assert!(engine
            .check_any_permission(Some(&accountant), &[Permission::DeleteContacts, Permission::ViewContacts])
            .is_allowed());
        assert!(!engine
            .check_all_permissions(Some(&accountant), &[Permission::ViewContacts, Permission::EditContacts])
            .is_allowed());
        assert!(engine
            .check_all_permissions(Some(&accountant), &[Permission::ViewInvoices, Permission::SendInvoices])
            .is_allowed());
    }

    #[test]
    fn test_empty_sets() {
        let (engine, _) = engine(Environment::Test);
        let owner = identity(Role::Owner);

        assert!(!engine.check_any_permission(Some(&owner), &[]).is_allowed());
        assert!(engine.check_all_permissions(Some(&owner), &[]).is_allowed());
        assert!(!engine.check_all_permissions(None, &[]).is_allowed());
        assert!(!engine.check_role(Some(&owner), &[]).is_allowed());
    }

    #[test]
    fn test_require_role() {
        let (engine, sink) = engine(Environment::Production);
        let manager = identity(Role::Manager);

        let decision = engine.check_role(Some(&manager), &[Role::Owner, Role::SuperAdmin]);
        let response = decision.into_response().unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(
            response.body.required_roles,
            Some(vec!["OWNER".to_string(), "SUPER_ADMIN".to_string()])
        );
        assert_eq!(sink.events()[0].action, AuditAction::RoleCheck);

        assert!(engine.check_role(Some(&identity(Role::Owner)), &[Role::Owner]).is_allowed());
    }

    #[test]
    fn test_into_result_maps_to_trust_error() {
        let (engine, _) = engine(Environment::Test);
        assert_eq!(
            engine.check_permission(None, Permission::ViewDashboard).into_result(),
            Err(TrustError::Unauthenticated)
        );
        assert_eq!(
            engine.check_permission(Some(&identity(Role::User)), Permission::ViewDashboard).into_result(),
            Ok(())
        );
    }
}
