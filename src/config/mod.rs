//! Configuration types for the marketplace API client.
//!
//! This module provides the core configuration types used to initialize
//! an [`ApiClient`](crate::clients::ApiClient) for one marketplace platform.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`MarketplaceConfig`]: The main configuration struct holding all client settings
//! - [`MarketplaceConfigBuilder`]: A builder for constructing [`MarketplaceConfig`] instances
//! - [`PartnerId`]: A validated partner ID newtype
//! - [`PartnerKey`]: A validated partner key newtype with masked debug output
//! - [`BaseUrl`]: A validated API or callback base URL
//! - [`Environment`]: Production or sandbox endpoint selection
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::{Environment, MarketplaceConfig, PartnerId, PartnerKey};
//!
//! let config = MarketplaceConfig::builder()
//!     .partner_id(PartnerId::new(2_001_234).unwrap())
//!     .partner_key(PartnerKey::new("my-partner-key").unwrap())
//!     .environment(Environment::Sandbox)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.base_url().as_ref(), Environment::Sandbox.base_url());
//! ```

mod newtypes;

pub use newtypes::{BaseUrl, PartnerId, PartnerKey};

use std::time::Duration;

use crate::clients::{RateLimitConfig, RetryPolicy};
use crate::error::ConfigError;

/// Production Open Platform host.
pub const PRODUCTION_BASE_URL: &str = "https://partner.shopeemobile.com";

/// Sandbox Open Platform host.
pub const SANDBOX_BASE_URL: &str = "https://openplatform.sandbox.test-stable.shopee.sg";

/// Default per-request network timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default platform name used for logging and registry lookups.
pub const DEFAULT_PLATFORM: &str = "shopee";

/// Which Open Platform deployment to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    /// Live partner endpoints.
    #[default]
    Production,
    /// Sandbox endpoints for integration testing.
    Sandbox,
}

impl Environment {
    /// Returns the base URL for this environment.
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_BASE_URL,
            Self::Sandbox => SANDBOX_BASE_URL,
        }
    }
}

/// Configuration for one marketplace API client.
///
/// # Thread Safety
///
/// `MarketplaceConfig` is `Clone`, `Send`, and `Sync`, making it safe to share
/// across threads and async tasks.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use marketplace_api::{MarketplaceConfig, PartnerId, PartnerKey, RetryPolicy};
///
/// let config = MarketplaceConfig::builder()
///     .partner_id(PartnerId::new(1).unwrap())
///     .partner_key(PartnerKey::new("key").unwrap())
///     .request_timeout(Duration::from_secs(10))
///     .retry_policy(RetryPolicy::default().with_max_attempts(5))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.retry_policy().max_attempts(), 5);
/// ```
#[derive(Clone, Debug)]
pub struct MarketplaceConfig {
    platform: String,
    partner_id: PartnerId,
    partner_key: PartnerKey,
    environment: Environment,
    base_url: BaseUrl,
    webhook_url: Option<BaseUrl>,
    request_timeout: Duration,
    user_agent_prefix: Option<String>,
    retry_policy: RetryPolicy,
    rate_limit: RateLimitConfig,
}

impl MarketplaceConfig {
    /// Creates a new builder for constructing a `MarketplaceConfig`.
    #[must_use]
    pub fn builder() -> MarketplaceConfigBuilder {
        MarketplaceConfigBuilder::new()
    }

    /// Returns the platform name (e.g., `shopee`).
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Returns the partner ID.
    #[must_use]
    pub const fn partner_id(&self) -> PartnerId {
        self.partner_id
    }

    /// Returns the partner key.
    #[must_use]
    pub const fn partner_key(&self) -> &PartnerKey {
        &self.partner_key
    }

    /// Returns the configured environment.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the base URL requests are sent to.
    ///
    /// This is the explicit override if one was configured, otherwise the
    /// environment's default host.
    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Returns the webhook callback base URL, if configured.
    #[must_use]
    pub const fn webhook_url(&self) -> Option<&BaseUrl> {
        self.webhook_url.as_ref()
    }

    /// Returns the per-request network timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the rate limit configuration.
    #[must_use]
    pub const fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }
}

// Verify MarketplaceConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MarketplaceConfig>();
};

/// Builder for constructing [`MarketplaceConfig`] instances.
///
/// Required fields are `partner_id` and `partner_key`.
///
/// # Defaults
///
/// - `platform`: `shopee`
/// - `environment`: [`Environment::Production`]
/// - `base_url`: the environment's host
/// - `request_timeout`: 30 seconds
/// - `retry_policy`: [`RetryPolicy::default`]
/// - `rate_limit`: [`RateLimitConfig::default`]
#[derive(Debug, Default)]
pub struct MarketplaceConfigBuilder {
    platform: Option<String>,
    partner_id: Option<PartnerId>,
    partner_key: Option<PartnerKey>,
    environment: Option<Environment>,
    base_url: Option<BaseUrl>,
    webhook_url: Option<BaseUrl>,
    request_timeout: Option<Duration>,
    user_agent_prefix: Option<String>,
    retry_policy: Option<RetryPolicy>,
    rate_limit: Option<RateLimitConfig>,
}

impl MarketplaceConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the platform name.
    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Sets the partner ID (required).
    #[must_use]
    pub const fn partner_id(mut self, id: PartnerId) -> Self {
        self.partner_id = Some(id);
        self
    }

    /// Sets the partner key (required).
    #[must_use]
    pub fn partner_key(mut self, key: PartnerKey) -> Self {
        self.partner_key = Some(key);
        self
    }

    /// Selects production or sandbox endpoints.
    #[must_use]
    pub const fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Overrides the base URL (proxies, mock servers).
    #[must_use]
    pub fn base_url(mut self, url: BaseUrl) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the webhook callback base URL used for signature verification.
    #[must_use]
    pub fn webhook_url(mut self, url: BaseUrl) -> Self {
        self.webhook_url = Some(url);
        self
    }

    /// Sets the per-request network timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the user agent prefix for HTTP requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the rate limit configuration.
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Builds the [`MarketplaceConfig`], validating every field.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingRequiredField`] if `partner_id` or `partner_key` is not set
    /// - [`ConfigError::InvalidRetryPolicy`] if the retry policy is unusable
    /// - [`ConfigError::InvalidRateLimit`] if any rate limit is unusable
    pub fn build(self) -> Result<MarketplaceConfig, ConfigError> {
        let partner_id = self.partner_id.ok_or(ConfigError::MissingRequiredField {
            field: "partner_id",
        })?;
        let partner_key = self.partner_key.ok_or(ConfigError::MissingRequiredField {
            field: "partner_key",
        })?;

        let environment = self.environment.unwrap_or_default();
        let base_url = match self.base_url {
            Some(url) => url,
            None => BaseUrl::new(environment.base_url())?,
        };

        let retry_policy = self.retry_policy.unwrap_or_default();
        retry_policy.validate()?;

        let rate_limit = self.rate_limit.unwrap_or_default();
        rate_limit.validate()?;

        Ok(MarketplaceConfig {
            platform: self
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            partner_id,
            partner_key,
            environment,
            base_url,
            webhook_url: self.webhook_url,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            user_agent_prefix: self.user_agent_prefix,
            retry_policy,
            rate_limit,
        })
    }
}
