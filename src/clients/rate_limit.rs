//! Per-endpoint-category token bucket rate limiting.
//!
//! Each request path is mapped to a bucket by longest matching registered
//! prefix (falling back to a `default` bucket). Buckets refill lazily on each
//! access, so no background task or central scheduler is involved.
//!
//! The limiter never rejects a request permanently; it only tells the caller
//! how long to wait.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::clients::{PathLimit, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(
//!     RateLimitConfig::new(10, 20).with_path_limit("/api/v2/auth/", PathLimit::new(5, 10)),
//! );
//!
//! assert_eq!(limiter.bucket_key("/api/v2/auth/token/get"), "/api/v2/auth/");
//! assert_eq!(limiter.bucket_key("/api/v2/shop/get_shop_info"), "default");
//! assert!(limiter.try_acquire("/api/v2/auth/token/get"));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clients::errors::ClientError;
use crate::error::ConfigError;

/// Bucket key used for paths that match no registered prefix.
pub const DEFAULT_BUCKET: &str = "default";

/// Rate limit for one path prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLimit {
    /// Sustained requests per second.
    pub rps: u32,
    /// Maximum requests that may be made at once.
    pub burst: u32,
}

impl PathLimit {
    /// Creates a new path limit.
    #[must_use]
    pub const fn new(rps: u32, burst: u32) -> Self {
        Self { rps, burst }
    }

    fn validate(self, prefix: &str) -> Result<(), ConfigError> {
        let reason = if self.rps == 0 {
            "rps must be greater than zero"
        } else if self.burst == 0 {
            "burst must be at least one"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidRateLimit {
            prefix: prefix.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// Rate limit configuration.
///
/// Path prefixes are kept in a sorted map so the configuration serializes
/// deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second for unmatched paths.
    pub default_rps: u32,
    /// Burst size for unmatched paths.
    pub default_burst: u32,
    /// Per-prefix overrides.
    #[serde(default)]
    pub path_limits: BTreeMap<String, PathLimit>,
}

impl Default for RateLimitConfig {
    /// Production-safe limits for the Open Platform API groups.
    fn default() -> Self {
        Self::new(10, 20)
            .with_path_limit("/api/v2/product/", PathLimit::new(10, 20))
            .with_path_limit("/api/v2/order/", PathLimit::new(10, 20))
            .with_path_limit("/api/v2/shop/", PathLimit::new(10, 15))
            .with_path_limit("/api/v2/auth/", PathLimit::new(5, 10))
            .with_path_limit("/api/v2/media_space/", PathLimit::new(5, 10))
            .with_path_limit("/api/v2/logistics/", PathLimit::new(10, 15))
    }
}

impl RateLimitConfig {
    /// Creates a configuration with only a default bucket.
    #[must_use]
    pub const fn new(default_rps: u32, default_burst: u32) -> Self {
        Self {
            default_rps,
            default_burst,
            path_limits: BTreeMap::new(),
        }
    }

    /// Adds or replaces the limit for a path prefix.
    #[must_use]
    pub fn with_path_limit(mut self, prefix: impl Into<String>, limit: PathLimit) -> Self {
        self.path_limits.insert(prefix.into(), limit);
        self
    }

    /// Checks that every bucket can admit requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] for a zero rate or burst.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PathLimit::new(self.default_rps, self.default_burst).validate(DEFAULT_BUCKET)?;
        for (prefix, limit) in &self.path_limits {
            limit.validate(prefix)?;
        }
        Ok(())
    }

    /// Returns the longest registered prefix matching `path`.
    fn matching_prefix(&self, path: &str) -> Option<(&str, PathLimit)> {
        self.path_limits
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, limit)| (prefix.as_str(), *limit))
    }
}

/// Snapshot of one bucket, as returned by [`RateLimiter::status`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketStatus {
    /// Tokens available when the snapshot was taken.
    pub available_tokens: f64,
    /// Bucket capacity.
    pub max_tokens: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Classic token bucket with lazily computed refill.
///
/// Invariant: `0 <= tokens <= max_tokens` whenever the lock is released.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    max_tokens: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub(crate) fn new(limit: PathLimit, now: Instant) -> Self {
        let max_tokens = f64::from(limit.burst);
        Self {
            max_tokens,
            refill_rate: f64::from(limit.rps),
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: now,
            }),
        }
    }

    /// Takes one token if available, otherwise returns how long until one is.
    pub(crate) fn take_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Duration::ZERO;
        }

        let deficit = 1.0 - state.tokens;
        Duration::from_secs_f64(deficit / self.refill_rate)
    }

    pub(crate) fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        if now > state.last_refill {
            state.last_refill = now;
        }
    }

    fn status_at(&self, now: Instant) -> BucketStatus {
        BucketStatus {
            available_tokens: self.available_at(now),
            max_tokens: self.max_tokens,
            refill_rate: self.refill_rate,
        }
    }
}

/// Token bucket rate limiter keyed by path prefix.
///
/// # Thread Safety
///
/// The bucket map sits behind a read-mostly lock; buckets are created lazily
/// with a check-under-read-lock, create-under-write-lock, recheck sequence so
/// concurrent first use never produces duplicate buckets. Each bucket has its
/// own lock for its counters.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    /// Creates a limiter from a configuration.
    ///
    /// The configuration is assumed to have passed
    /// [`RateLimitConfig::validate`].
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration this limiter was built from.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns the bucket key a path maps to.
    #[must_use]
    pub fn bucket_key(&self, path: &str) -> &str {
        self.config
            .matching_prefix(path)
            .map_or(DEFAULT_BUCKET, |(prefix, _)| prefix)
    }

    /// Waits until a request for `path` may be sent.
    ///
    /// Returns immediately when a token is available.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cancelled`] if `cancel` fires before the wait
    /// completes.
    pub async fn wait(&self, cancel: &CancellationToken, path: &str) -> Result<(), ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let wait = self.bucket(path).take_at(Instant::now());
        if wait.is_zero() {
            return Ok(());
        }

        tracing::debug!(
            bucket = self.bucket_key(path),
            wait_ms = wait.as_millis(),
            "rate limit reached, waiting"
        );

        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            () = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// Takes a token for `path` without waiting.
    ///
    /// Returns `false` if the bucket is empty.
    #[must_use]
    pub fn try_acquire(&self, path: &str) -> bool {
        self.bucket(path).take_at(Instant::now()).is_zero()
    }

    /// Returns the state of every bucket created so far.
    #[must_use]
    pub fn status(&self) -> HashMap<String, BucketStatus> {
        let now = Instant::now();
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        buckets
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.status_at(now)))
            .collect()
    }

    pub(crate) fn bucket(&self, path: &str) -> Arc<TokenBucket> {
        let (key, limit) = self.config.matching_prefix(path).unwrap_or((
            DEFAULT_BUCKET,
            PathLimit::new(self.config.default_rps, self.config.default_burst),
        ));

        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have created it between the two locks.
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokenBucket::new(limit, Instant::now()))),
        )
    }
}
