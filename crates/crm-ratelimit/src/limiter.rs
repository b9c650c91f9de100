//! Rate limiter
//!
//! One bucket per `ratelimit:{class}:{identifier}` key. The limiter keeps no
//! state of its own; every admission goes through the counter store.

use crate::classes::{ActionClass, ActionLimit, FailurePolicy, LimitTable};
use crate::store::{window_span, CounterStore};
use crate::RateLimitError;
use chrono::{DateTime, TimeZone, Utc};
use crm_common::{Clock, Environment, TrustError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Counter store answered
    Store,
    /// Store failed; class fails closed
    FailClosed,
    /// Store failed; class fails open
    FailOpen,
}

/// Admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Admissions left in the window
    pub remaining: u32,
    /// Configured limit
    pub limit: u32,
    /// When capacity returns
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until `reset_at`, set on denial
    pub retry_after_secs: Option<u64>,
    /// Where the decision came from
    pub source: DecisionSource,
}

impl RateLimitDecision {
    /// Quota headers for the response
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit".to_string(), self.limit.to_string()),
            ("X-RateLimit-Remaining".to_string(), self.remaining.to_string()),
            ("X-RateLimit-Reset".to_string(), self.reset_at.timestamp().to_string()),
        ];

        if let Some(retry) = self.retry_after_secs {
            headers.push(("Retry-After".to_string(), retry.to_string()));
        }

        headers
    }

    /// Admitted decision, or the boundary error for a denial
    pub fn into_result(self) -> Result<Self, TrustError> {
        if self.allowed {
            return Ok(self);
        }
        Err(TrustError::RateLimited {
            limit: self.limit,
            reset_at: self.reset_at,
            retry_after_secs: self.retry_after_secs.unwrap_or(1),
        })
    }
}

/// Window usage without recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Admissions in the current window
    pub used: u32,
    /// Configured limit
    pub limit: u32,
    /// Admissions left
    pub remaining: u32,
    /// When the oldest admission ages out, if any
    pub reset_at: Option<DateTime<Utc>>,
}

/// Sliding-window rate limiter
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limits: LimitTable,
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a limiter over a counter store
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, limits: LimitTable) -> Self {
        Self { store, clock, limits, store_timeout: DEFAULT_STORE_TIMEOUT }
    }

    /// Bound on every counter store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Configured limits
    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Refuse an in-process store in production unless explicitly allowed
    pub fn validate_deployment(&self, environment: Environment, allow_in_process: bool) -> Result<(), RateLimitError> {
        if !self.store.is_in_process() || !environment.is_production() {
            return Ok(());
        }
        if !allow_in_process {
            return Err(RateLimitError::InProcessStoreInProduction);
        }
        warn!("in-process counter store in production; limits are per instance");
        Ok(())
    }

    /// Store key of a bucket
    pub fn bucket_key(class: &ActionClass, identifier: &str) -> String {
        format!("ratelimit:{}:{}", class.as_str(), identifier)
    }

    /// Admit or refuse one request, recording it when admitted
    pub async fn check(&self, identifier: &str, class: &ActionClass) -> RateLimitDecision {
        let limit = *self.limits.limit_for(class);
        let key = Self::bucket_key(class, identifier);
        let now_ms = self.clock.now_ms();

        let outcome = self
            .bounded(self.store.check_and_record(&key, now_ms, limit.window_ms, limit.max_attempts))
            .await;

        match outcome {
            Ok(outcome) if outcome.admitted => {
                let remaining = limit.max_attempts.saturating_sub(outcome.count + 1);
                debug!(key = %key, count = outcome.count + 1, remaining, "rate limit admitted");
                RateLimitDecision {
                    allowed: true,
                    remaining,
                    limit: limit.max_attempts,
                    reset_at: to_datetime(window_end(now_ms, limit.window_ms)),
                    retry_after_secs: None,
                    source: DecisionSource::Store,
                }
            }
            Ok(outcome) => {
                let reset_ms = window_end(outcome.oldest_ms.unwrap_or(now_ms), limit.window_ms);
                warn!(
                    target: "security",
                    key = %key,
                    count = outcome.count,
                    limit = limit.max_attempts,
                    "rate limit exceeded"
                );
                denied(&limit, now_ms, reset_ms, DecisionSource::Store)
            }
            Err(e) => self.on_store_failure(&key, &limit, now_ms, e),
        }
    }

    /// Current usage of a bucket without recording
    pub async fn status(&self, identifier: &str, class: &ActionClass) -> Result<RateLimitStatus, RateLimitError> {
        let limit = *self.limits.limit_for(class);
        let key = Self::bucket_key(class, identifier);
        let now_ms = self.clock.now_ms();

        let snapshot = self.bounded(self.store.count(&key, now_ms, limit.window_ms)).await?;
        Ok(RateLimitStatus {
            used: snapshot.count,
            limit: limit.max_attempts,
            remaining: limit.max_attempts.saturating_sub(snapshot.count),
            reset_at: snapshot.oldest_ms.map(|t| to_datetime(window_end(t, limit.window_ms))),
        })
    }

    /// Clear a bucket, e.g. after a successful login
    pub async fn reset(&self, identifier: &str, class: &ActionClass) -> Result<(), RateLimitError> {
        let key = Self::bucket_key(class, identifier);
        self.bounded(self.store.clear(&key)).await?;
        debug!(key = %key, "rate limit bucket cleared");
        Ok(())
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, RateLimitError>
    where
        F: std::future::Future<Output = Result<T, crate::CounterStoreError>>,
    {
        bounded(self.store_timeout, fut).await
    }

    fn on_store_failure(&self, key: &str, limit: &ActionLimit, now_ms: i64, err: RateLimitError) -> RateLimitDecision {
        error!(key = %key, error = %err, "counter store failure");
        match limit.on_store_failure {
            FailurePolicy::Open => {
                warn!(key = %key, "rate limit failing open");
                RateLimitDecision {
                    allowed: true,
                    remaining: limit.max_attempts.saturating_sub(1),
                    limit: limit.max_attempts,
                    reset_at: to_datetime(window_end(now_ms, limit.window_ms)),
                    retry_after_secs: None,
                    source: DecisionSource::FailOpen,
                }
            }
            FailurePolicy::Closed => {
                warn!(target: "security", key = %key, "rate limit failing closed");
                denied(limit, now_ms, window_end(now_ms, limit.window_ms), DecisionSource::FailClosed)
            }
        }
    }
}

fn denied(limit: &ActionLimit, now_ms: i64, reset_ms: i64, source: DecisionSource) -> RateLimitDecision {
    let wait_ms = reset_ms.saturating_sub(now_ms).max(0) as u64;
    RateLimitDecision {
        allowed: false,
        remaining: 0,
        limit: limit.max_attempts,
        reset_at: to_datetime(reset_ms),
        retry_after_secs: Some(wait_ms.div_ceil(1000).max(1)),
        source,
    }
}

/// Run a counter store call under `timeout`
pub(crate) async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, RateLimitError>
where
    F: std::future::Future<Output = Result<T, crate::CounterStoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(RateLimitError::from),
        Err(_) => Err(RateLimitError::StoreTimeout(timeout.as_millis() as u64)),
    }
}

fn window_end(from_ms: i64, window_ms: u64) -> i64 {
    from_ms.saturating_add(window_span(window_ms))
}

pub(crate) fn to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
