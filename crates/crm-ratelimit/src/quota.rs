//! Monthly AI quota per tenant
//!
//! One fixed counter per tenant and calendar month (UTC), keyed
//! `ai:quota:{tenant}:{YYYY-MM}`. A new month means a new key, so usage
//! starts over at midnight UTC on the first. Counters expire 31 days after
//! their first increment.

use crate::classes::FailurePolicy;
use crate::limiter::{bounded, to_datetime, DecisionSource};
use crate::store::CounterStore;
use crate::RateLimitError;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use crm_common::{Clock, TenantId, TrustError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);
const COUNTER_TTL_MS: i64 = 31 * 24 * 60 * 60 * 1000;
const STORE_RETRY_SECS: u64 = 60;

/// Subscription plan of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    /// Free tier
    Free,
    /// Starter tier
    Starter,
    /// Professional tier
    Pro,
    /// Enterprise tier, unlimited AI usage
    Enterprise,
}

impl Plan {
    /// Every plan
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Starter, Plan::Pro, Plan::Enterprise];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Starter => "STARTER",
            Self::Pro => "PRO",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// AI queries per month, `None` for unlimited
    pub fn monthly_ai_limit(&self) -> Option<u32> {
        match self {
            Self::Free => Some(10),
            Self::Starter => Some(100),
            Self::Pro => Some(1_000),
            Self::Enterprise => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|plan| plan.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RateLimitError::UnknownPlan(s.to_string()))
    }
}

/// Outcome of consuming one unit of AI quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether the query may run
    pub allowed: bool,
    /// Queries counted this month, including this one when allowed
    pub used: u32,
    /// Monthly limit, `None` for unlimited
    pub limit: Option<u32>,
    /// Queries left this month, `None` for unlimited
    pub remaining: Option<u32>,
    /// Start of the next month
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the caller may retry, set on denial
    pub retry_after_secs: Option<u64>,
    /// Where the decision came from
    pub source: DecisionSource,
}

impl QuotaDecision {
    /// Allowed decision, or the boundary error for a denial
    pub fn into_result(self) -> Result<Self, TrustError> {
        if self.allowed {
            return Ok(self);
        }
        Err(TrustError::RateLimited {
            limit: self.limit.unwrap_or(0),
            reset_at: self.reset_at,
            retry_after_secs: self.retry_after_secs.unwrap_or(1),
        })
    }
}

/// Monthly AI quota over a counter store
pub struct TenantQuota {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    on_store_failure: FailurePolicy,
}

impl TenantQuota {
    /// Quota tracker that fails open, like the `ai_chat` class
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, store_timeout: DEFAULT_STORE_TIMEOUT, on_store_failure: FailurePolicy::Open }
    }

    /// Bound on every counter store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Policy for limited plans when the store cannot answer
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_store_failure = policy;
        self
    }

    /// Month label of a timestamp, `YYYY-MM`
    pub fn period(at: DateTime<Utc>) -> String {
        at.format("%Y-%m").to_string()
    }

    /// Store key of a tenant's counter for a month
    pub fn quota_key(tenant: &TenantId, period: &str) -> String {
        format!("ai:quota:{}:{}", tenant.as_str(), period)
    }

    /// Count one AI query against the tenant's monthly quota
    pub async fn consume(&self, tenant: &TenantId, plan: Plan) -> QuotaDecision {
        let now_ms = self.clock.now_ms();
        let now = to_datetime(now_ms);
        let key = Self::quota_key(tenant, &Self::period(now));
        let reset_at = next_period_start(now);
        let limit = plan.monthly_ai_limit();

        let outcome = bounded(
            self.store_timeout,
            self.store
                .increment_below(&key, now_ms, limit.unwrap_or(u32::MAX), now_ms.saturating_add(COUNTER_TTL_MS)),
        )
        .await;

        match outcome {
            Ok(outcome) if outcome.admitted || limit.is_none() => {
                debug!(key = %key, used = outcome.count, %plan, "ai quota consumed");
                QuotaDecision {
                    allowed: true,
                    used: outcome.count,
                    limit,
                    remaining: limit.map(|l| l.saturating_sub(outcome.count)),
                    reset_at,
                    retry_after_secs: None,
                    source: DecisionSource::Store,
                }
            }
            Ok(outcome) => {
                warn!(target: "security", key = %key, used = outcome.count, %plan, "ai quota exhausted");
                let wait_ms = reset_at.timestamp_millis().saturating_sub(now_ms).max(0) as u64;
                QuotaDecision {
                    allowed: false,
                    used: outcome.count,
                    limit,
                    remaining: Some(0),
                    reset_at,
                    retry_after_secs: Some(wait_ms.div_ceil(1000).max(1)),
                    source: DecisionSource::Store,
                }
            }
            Err(e) => {
                error!(key = %key, error = %e, "counter store failure");
                // Unlimited plans never depend on the store.
                if limit.is_none() || self.on_store_failure == FailurePolicy::Open {
                    warn!(key = %key, "ai quota failing open");
                    return QuotaDecision {
                        allowed: true,
                        used: 0,
                        limit,
                        remaining: limit.map(|l| l.saturating_sub(1)),
                        reset_at,
                        retry_after_secs: None,
                        source: DecisionSource::FailOpen,
                    };
                }
                warn!(target: "security", key = %key, "ai quota failing closed");
                QuotaDecision {
                    allowed: false,
                    used: 0,
                    limit,
                    remaining: Some(0),
                    reset_at,
                    retry_after_secs: Some(STORE_RETRY_SECS),
                    source: DecisionSource::FailClosed,
                }
            }
        }
    }

    /// Queries counted this month
    pub async fn usage(&self, tenant: &TenantId) -> Result<u32, RateLimitError> {
        let now_ms = self.clock.now_ms();
        let key = Self::quota_key(tenant, &Self::period(to_datetime(now_ms)));
        bounded(self.store_timeout, self.store.counter(&key, now_ms)).await
    }

    /// Queries left this month, `None` for unlimited plans
    pub async fn remaining(&self, tenant: &TenantId, plan: Plan) -> Result<Option<u32>, RateLimitError> {
        let Some(limit) = plan.monthly_ai_limit() else {
            return Ok(None);
        };
        let used = self.usage(tenant).await?;
        Ok(Some(limit.saturating_sub(used)))
    }
}

fn next_period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 { (now.year() + 1, 1) } else { (now.year(), now.month() + 1) };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;
    use crate::testing::BrokenStore;
    use crm_common::ManualClock;

    fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> i64 {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap().timestamp_millis()
    }

    fn quota(start_ms: i64) -> (TenantQuota, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        (TenantQuota::new(Arc::new(MemoryCounterStore::new()), clock.clone()), clock)
    }

    #[test]
    fn test_plan_limits() {
        assert_eq!(Plan::Free.monthly_ai_limit(), Some(10));
        assert_eq!(Plan::Starter.monthly_ai_limit(), Some(100));
        assert_eq!(Plan::Pro.monthly_ai_limit(), Some(1_000));
        assert_eq!(Plan::Enterprise.monthly_ai_limit(), None);
        assert_eq!("pro".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!("PLATINUM".parse::<Plan>(), Err(RateLimitError::UnknownPlan("PLATINUM".into())));
    }

    #[test]
    fn test_quota_key_format() {
        let period = TenantQuota::period(Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap());
        assert_eq!(period, "2024-03");
        assert_eq!(TenantQuota::quota_key(&TenantId::new("t-1"), &period), "ai:quota:t-1:2024-03");
    }

    #[tokio::test]
    async fn test_free_plan_stops_at_ten() {
        let (quota, _) = quota(at(2024, 3, 9, 12, 0, 0));
        let tenant = TenantId::new("t-1");

        for used in 1..=10 {
            let decision = quota.consume(&tenant, Plan::Free).await;
            assert!(decision.allowed);
            assert_eq!(decision.used, used);
            assert_eq!(decision.remaining, Some(10 - used));
        }

        let denied = quota.consume(&tenant, Plan::Free).await;
        assert!(!denied.allowed);
        assert_eq!(denied.used, 10);
        assert_eq!(denied.reset_at, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(denied.into_result().unwrap_err().status(), 429);

        assert_eq!(quota.usage(&tenant).await.unwrap(), 10);
        assert_eq!(quota.remaining(&tenant, Plan::Free).await.unwrap(), Some(0));

        // Upgrading raises the ceiling over the same counter.
        assert!(quota.consume(&tenant, Plan::Starter).await.allowed);
        assert_eq!(quota.remaining(&tenant, Plan::Starter).await.unwrap(), Some(89));
    }

    #[tokio::test]
    async fn test_tenants_have_separate_counters() {
        let (quota, _) = quota(at(2024, 3, 9, 12, 0, 0));
        for _ in 0..10 {
            quota.consume(&TenantId::new("a"), Plan::Free).await;
        }
        assert!(!quota.consume(&TenantId::new("a"), Plan::Free).await.allowed);
        assert!(quota.consume(&TenantId::new("b"), Plan::Free).await.allowed);
    }

    #[tokio::test]
    async fn test_enterprise_is_unlimited_but_counted() {
        let (quota, _) = quota(at(2024, 3, 9, 12, 0, 0));
        let tenant = TenantId::new("big-co");

        for _ in 0..1_500 {
            let decision = quota.consume(&tenant, Plan::Enterprise).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, None);
        }
        assert_eq!(quota.usage(&tenant).await.unwrap(), 1_500);
        assert_eq!(quota.remaining(&tenant, Plan::Enterprise).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_month_rollover_starts_fresh() {
        let (quota, clock) = quota(at(2024, 1, 31, 23, 59, 59));
        let tenant = TenantId::new("t-1");

        for _ in 0..10 {
            quota.consume(&tenant, Plan::Free).await;
        }
        let denied = quota.consume(&tenant, Plan::Free).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(1));

        clock.advance_ms(1_000);
        let decision = quota.consume(&tenant, Plan::Free).await;
        assert!(decision.allowed);
        assert_eq!(decision.used, 1);
        assert_eq!(decision.reset_at, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let dec = Utc.with_ymd_and_hms(2024, 12, 15, 8, 0, 0).unwrap();
        assert_eq!(next_period_start(dec), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_policy() {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 9, 12, 0, 0)));
        let tenant = TenantId::new("t-1");

        let open = TenantQuota::new(Arc::new(BrokenStore), clock.clone());
        let decision = open.consume(&tenant, Plan::Free).await;
        assert!(decision.allowed);
        assert_eq!(decision.source, DecisionSource::FailOpen);
        assert!(open.usage(&tenant).await.is_err());

        let closed = TenantQuota::new(Arc::new(BrokenStore), clock).with_failure_policy(FailurePolicy::Closed);
        let decision = closed.consume(&tenant, Plan::Pro).await;
        assert!(!decision.allowed);
        assert_eq!(decision.source, DecisionSource::FailClosed);
        assert!(closed.consume(&tenant, Plan::Enterprise).await.allowed);
    }
}
