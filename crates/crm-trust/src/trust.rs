//! Trust core assembly

use crate::settings::{ConfigError, TrustConfig};
use crm_authz::{AuditSink, AuthorizationEngine, IdentityResolver, Permission, RolePermissionTable, TracingAuditSink};
use crm_common::{Clock, Environment, Identity, SystemClock, TrustError, TrustResult};
use crm_crypto::{FieldEncryptor, MasterSecret};
use crm_ratelimit::{
    client_identifier, ActionClass, CounterStore, LimitTable, MemoryCounterStore, Plan, QuotaDecision,
    RateLimitDecision, RateLimiter, TenantQuota,
};
use crm_tenant::TenantScopeGuard;
use std::sync::Arc;
use tracing::info;

/// Every trust component, built once at startup and shared across requests
pub struct TrustCore {
    environment: Environment,
    authz: AuthorizationEngine,
    tenant_guard: TenantScopeGuard,
    rate_limiter: RateLimiter,
    ai_quota: TenantQuota,
    encryptor: FieldEncryptor,
}

impl TrustCore {
    /// Build and validate every component. Any failure is fatal.
    pub fn new(
        config: &TrustConfig,
        store: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let audited_allows = config
            .authorization
            .audited_allows
            .iter()
            .map(|token| token.parse::<Permission>())
            .collect::<Result<Vec<_>, _>>()?;

        let table = Arc::new(RolePermissionTable::default());
        let authz = AuthorizationEngine::new(table, audit.clone(), config.environment)
            .with_resolve_timeout(config.identity.resolve_timeout())
            .with_audited_allows(audited_allows);

        let ai_quota = TenantQuota::new(store.clone(), clock.clone())
            .with_store_timeout(config.rate_limit.store_timeout())
            .with_failure_policy(config.rate_limit.ai_quota_on_store_failure);
        let rate_limiter = RateLimiter::new(store, clock, limit_table(config)?)
            .with_store_timeout(config.rate_limit.store_timeout());
        rate_limiter.validate_deployment(config.environment, config.rate_limit.allow_in_process_store)?;

        let encryptor = field_encryptor(config)?;

        info!(
            environment = ?config.environment,
            permissions = authz.table().permission_count(),
            kdf_iterations = encryptor.iterations(),
            "trust core ready"
        );

        Ok(Self {
            environment: config.environment,
            authz,
            tenant_guard: TenantScopeGuard::new(audit),
            rate_limiter,
            ai_quota,
            encryptor,
        })
    }

    /// Build with the in-process counter store, tracing audit sink and system clock
    pub fn in_process(config: &TrustConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(TracingAuditSink),
            Arc::new(SystemClock),
        )
    }

    /// Deployment mode
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Authorization engine
    pub fn authz(&self) -> &AuthorizationEngine {
        &self.authz
    }

    /// Tenant scope guard
    pub fn tenant_guard(&self) -> &TenantScopeGuard {
        &self.tenant_guard
    }

    /// Rate limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Monthly AI quota
    pub fn ai_quota(&self) -> &TenantQuota {
        &self.ai_quota
    }

    /// Field encryptor
    pub fn encryptor(&self) -> &FieldEncryptor {
        &self.encryptor
    }

    /// Resolve the caller and require `permission`, yielding the identity for later tenant checks
    pub async fn authorize(&self, resolver: &dyn IdentityResolver, permission: Permission) -> TrustResult<Identity> {
        let identity = self.authz.resolve(resolver).await.map_err(TrustError::from)?;
        self.authz.check_permission(Some(&identity), permission).into_result()?;
        Ok(identity)
    }

    /// Rate-limit a request by its client address headers
    pub async fn admit<'a, I>(&self, headers: I, class: &ActionClass) -> TrustResult<RateLimitDecision>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let identifier = client_identifier(headers, self.environment);
        self.rate_limiter.check(&identifier, class).await.into_result()
    }

    /// Count one AI query against the caller's tenant
    pub async fn consume_ai_quota(&self, identity: &Identity, plan: Plan) -> TrustResult<QuotaDecision> {
        self.ai_quota.consume(identity.tenant_id(), plan).await.into_result()
    }
}

/// Limit table from defaults plus configured overrides
pub fn limit_table(config: &TrustConfig) -> Result<LimitTable, ConfigError> {
    let mut table = LimitTable::default();
    for (name, limit) in &config.rate_limit.classes {
        table = table.with_class(&ActionClass::from(name.as_str()), *limit)?;
    }
    if let Some(default) = config.rate_limit.default_class {
        table = table.with_default(default)?;
    }
    Ok(table)
}

/// Field encryptor from the encryption section
pub fn field_encryptor(config: &TrustConfig) -> Result<FieldEncryptor, ConfigError> {
    let secret = config.master_secret().ok_or(ConfigError::MissingSecret)?;
    let encryptor = FieldEncryptor::new(MasterSecret::new(secret)?, config.encryption.kdf_iterations)?
        .with_kdf_timeout(config.encryption.kdf_timeout());
    Ok(encryptor)
}
