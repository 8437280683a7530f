//! Fixed-window rate limiter backed by a shared counter store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use super::key::CounterKey;
use super::policy::{ConsistencyMode, FailurePolicy};
use crate::config::{RateLimitingConfig, StoreConfig};
use crate::error::{Result, TollgateError};
use crate::identity::ClientIdentity;
use crate::store::{CounterStore, Increment};

/// Default maximum admitted requests per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default counter key prefix.
pub const DEFAULT_NAMESPACE: &str = "request_count";
/// Default bound on each store call.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Per-identity fixed-window limiter.
///
/// Holds no counters of its own: every evaluation reads and updates the
/// identity's record in the injected [`CounterStore`]. A record is created
/// with value 1 and a TTL of one window by the first request of a window and
/// disappears when the store expires it.
///
/// A request occupies position `stored + 1` in its window and is rejected when
/// that count exceeds the limit, so exactly `limit` requests are admitted per
/// window. Rejections never touch the stored count.
pub struct WindowLimiter {
    store: Arc<dyn CounterStore>,
    limit: u64,
    window: Duration,
    namespace: String,
    consistency: ConsistencyMode,
    failure_policy: FailurePolicy,
    store_timeout: Duration,
    read_retries: u32,
}

impl WindowLimiter {
    /// Create a limiter with the given limit and window and default settings.
    pub fn new(store: Arc<dyn CounterStore>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            namespace: DEFAULT_NAMESPACE.to_string(),
            consistency: ConsistencyMode::default(),
            failure_policy: FailurePolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            read_retries: 0,
        }
    }

    /// Create a limiter from configuration.
    pub fn from_config(
        store: Arc<dyn CounterStore>,
        rate_limiting: &RateLimitingConfig,
        store_config: &StoreConfig,
    ) -> Self {
        Self::new(store, rate_limiting.request_limit, rate_limiting.window())
            .with_namespace(&rate_limiting.namespace)
            .with_consistency(rate_limiting.consistency)
            .with_failure_policy(rate_limiting.failure_policy)
            .with_store_timeout(store_config.timeout())
            .with_read_retries(store_config.read_retries)
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Retry the read step up to `retries` extra times while the store is unreachable.
    ///
    /// Writes are never retried, so one request is counted at most once.
    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    /// The counter key for an identity.
    pub fn key_for(&self, identity: &ClientIdentity) -> CounterKey {
        CounterKey::new(&self.namespace, identity)
    }

    /// Evaluate one request from `identity`, consuming a slot when admitted.
    ///
    /// Store failures are handled according to the configured
    /// [`FailurePolicy`]: propagated, or turned into `Admit` / `Reject`.
    pub async fn check_and_consume(&self, identity: &ClientIdentity) -> Result<Decision> {
        match self.evaluate(identity).await {
            Err(err) if err.is_store_failure() => match self.failure_policy {
                FailurePolicy::Error => {
                    error!(identity = %identity, error = %err, "Rate limit evaluation failed");
                    Err(err)
                }
                FailurePolicy::Allow => {
                    warn!(identity = %identity, error = %err, "Counter store failed, admitting request");
                    Ok(Decision::Admit)
                }
                FailurePolicy::Deny => {
                    warn!(identity = %identity, error = %err, "Counter store failed, rejecting request");
                    Ok(Decision::Reject)
                }
            },
            other => other,
        }
    }

    /// Evaluate one request, always surfacing store failures.
    pub async fn evaluate(&self, identity: &ClientIdentity) -> Result<Decision> {
        let key = self.key_for(identity).to_string_key();

        trace!(
            key = %key,
            limit = self.limit,
            consistency = ?self.consistency,
            "Checking rate limit"
        );

        let decision = match self.consistency {
            ConsistencyMode::ReadThenWrite => self.read_then_write(&key).await?,
            ConsistencyMode::Atomic => self.atomic(&key).await?,
        };

        if decision == Decision::Reject {
            debug!(key = %key, limit = self.limit, "Rate limit exceeded");
        }
        Ok(decision)
    }

    /// The stored count for `identity`; absent and expired records read as 0.
    pub async fn current_count(&self, identity: &ClientIdentity) -> Result<u64> {
        let key = self.key_for(identity).to_string_key();
        Ok(self.read_count(&key).await?.unwrap_or(0))
    }

    async fn read_then_write(&self, key: &str) -> Result<Decision> {
        let Some(stored) = self.read_count(key).await? else {
            self.bounded(self.store.set_ex(key, self.window, 1)).await?;
            trace!(key = %key, "Opened new window");
            return Ok(Decision::Admit);
        };

        let count = stored.saturating_add(1);
        if count > self.limit {
            return Ok(Decision::Reject);
        }

        // The increment arms the window TTL itself if the record expired
        // after the read and was recreated, so no retry can strand it.
        let updated = self.bounded(self.store.incr_by(key, 1, self.window)).await?;
        if updated == 1 {
            debug!(key = %key, "Window expired mid-update, record recreated");
        }
        Ok(Decision::Admit)
    }

    async fn atomic(&self, key: &str) -> Result<Decision> {
        let outcome = self
            .bounded(self.store.increment_up_to(key, self.limit, self.window))
            .await?;

        Ok(match outcome {
            Increment::Applied(count) => {
                trace!(key = %key, count = count, "Slot consumed");
                Decision::Admit
            }
            Increment::Refused(_) => Decision::Reject,
        })
    }

    async fn read_count(&self, key: &str) -> Result<Option<u64>> {
        let mut attempt = 0;
        loop {
            match self.bounded(self.store.get(key)).await {
                Err(TollgateError::StoreUnavailable(reason)) if attempt < self.read_retries => {
                    attempt += 1;
                    warn!(
                        key = %key,
                        attempt = attempt,
                        reason = %reason,
                        "Counter read failed, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .map_err(|_| {
                TollgateError::StoreUnavailable(format!(
                    "store call timed out after {:?}",
                    self.store_timeout
                ))
            })?
    }
}

impl std::fmt::Debug for WindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("namespace", &self.namespace)
            .field("consistency", &self.consistency)
            .field("failure_policy", &self.failure_policy)
            .field("store_timeout", &self.store_timeout)
            .field("read_retries", &self.read_retries)
            .finish_non_exhaustive()
    }
}
