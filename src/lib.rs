//! # Marketplace API Rust Client
//!
//! A resilient client for marketplace Open Platform APIs (modeled on the
//! Shopee v2 partner API), providing request signing, rate limiting, retries
//! and token refresh for every outbound call, plus verification of inbound
//! webhook pushes.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`MarketplaceConfig`] and [`MarketplaceConfigBuilder`]
//! - Validated newtypes for partner credentials and URLs
//! - HMAC-SHA256 request signing via [`auth::Signer`]
//! - Concurrency-safe credentials with single-flight refresh via [`auth::CredentialState`]
//! - Per-endpoint token-bucket rate limiting via [`clients::RateLimiter`]
//! - Exponential backoff with jitter via [`RetryPolicy`]
//! - A structured error taxonomy via [`ApiError`] and [`ClientError`]
//! - Multipart media uploads
//! - Webhook verification and decoding via [`webhooks::WebhookVerifier`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use marketplace_api::{MarketplaceConfig, PartnerId, PartnerKey, RetryPolicy};
//!
//! let config = MarketplaceConfig::builder()
//!     .partner_id(PartnerId::new(2_001_234).unwrap())
//!     .partner_key(PartnerKey::new("your-partner-key").unwrap())
//!     .retry_policy(RetryPolicy::default().with_max_attempts(5))
//!     .request_timeout(Duration::from_secs(20))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.retry_policy().max_attempts(), 5);
//! ```
//!
//! ## Making API Requests
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use marketplace_api::auth::{Credential, OpenPlatformRefresher};
//! use marketplace_api::{ApiClient, HttpMethod, Request};
//! use tokio_util::sync::CancellationToken;
//!
//! let refresher = OpenPlatformRefresher::new(&config)?;
//! let client = ApiClient::new(config)?
//!     .with_credentials(
//!         Credential::new("access-token", 55001).with_refresh_token("refresh-token"),
//!     )
//!     .with_refresher(Arc::new(refresher));
//!
//! let request = Request::builder(HttpMethod::Get, "/api/v2/order/get_order_list")
//!     .query_param("time_range_field", "create_time")
//!     .query_param("page_size", "50")
//!     .authenticated()
//!     .build()?;
//!
//! let response = client.execute(&CancellationToken::new(), &request).await?;
//! println!("{:?}", response.response_field());
//! ```
//!
//! ## Media Upload
//!
//! ```rust,ignore
//! use marketplace_api::Request;
//!
//! let request = Request::upload_image("front.jpg", std::fs::read("front.jpg")?)?;
//! let response = client.execute(&cancel, &request).await?;
//! ```
//!
//! ## Webhooks
//!
//! ```rust,ignore
//! use marketplace_api::webhooks::{WebhookRequest, WebhookVerifier};
//!
//! let verifier = WebhookVerifier::from_config(&config)?;
//! let request = WebhookRequest::from_headers(body, headers);
//! let event = verifier.verify_and_parse(&request)?;
//! println!("{} for shop {}", event.event_type, event.shop_id);
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: Configuration is instance-based and passed explicitly
//! - **Fail-fast validation**: All newtypes and policies validate on construction
//! - **Thread-safe**: All types are `Send + Sync`
//! - **Async-first**: Designed for use with Tokio; every wait is cancellable

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod webhooks;

// Re-export public types at crate root for convenience
pub use config::{
    BaseUrl, Environment, MarketplaceConfig, MarketplaceConfigBuilder, PartnerId, PartnerKey,
};
pub use error::ConfigError;

// Re-export client types
pub use clients::{
    ApiClient, ApiError, ClientError, ErrorCategory, ErrorCode, HttpMethod, Request, Response,
    RetryPolicy,
};

// Re-export webhook types for convenience
pub use webhooks::{WebhookError, WebhookEvent, WebhookVerifier};
