//! Outbound API client for the marketplace Open Platform.
//!
//! This module provides the request pipeline every marketplace call goes
//! through: validation, proactive token refresh, per-endpoint rate limiting,
//! request signing, error classification and retry with backoff.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`ApiClient`]: The orchestrating client
//! - [`Request`]: A request to be sent to the API
//! - [`Response`]: A successful response with its envelope fields
//! - [`ApiError`]: A classified platform failure with [`ErrorCode`] and [`ErrorCategory`]
//! - [`ClientError`]: Every way a call can fail
//! - [`RateLimiter`]: Per-endpoint-category token buckets
//! - [`RetryPolicy`] / [`Executor`]: Exponential backoff with jitter
//! - [`MarketplaceClient`] / [`MarketplaceRegistry`]: Platform abstraction
//! - [`BatchRunner`]: Bounded concurrent execution
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_api::auth::Credential;
//! use marketplace_api::clients::{ApiClient, HttpMethod, Request};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ApiClient::new(config)?
//!     .with_credentials(Credential::new("access-token", 55001));
//!
//! let request = Request::builder(HttpMethod::Get, "/api/v2/product/get_item_list")
//!     .query_param("offset", "0")
//!     .query_param("page_size", "50")
//!     .authenticated()
//!     .build()?;
//!
//! let response = client.execute(&CancellationToken::new(), &request).await?;
//! ```
//!
//! # Retry Behavior
//!
//! - **Rate limit and server errors**: retried with exponential backoff
//! - **Transport errors**: retried with exponential backoff
//! - **Expired access token**: refreshed once, then retried
//! - **Other errors**: returned immediately
//!
//! ```rust
//! use marketplace_api::clients::{ApiError, ErrorCategory, ErrorCode};
//!
//! let error = ApiError::new(ErrorCode::from("error_exceed_limit"), "slow down", 429);
//! assert_eq!(error.category(), ErrorCategory::RateLimit);
//! assert!(error.is_retryable());
//! ```
//!
//! # Rate Limiting
//!
//! ```rust
//! use marketplace_api::clients::{PathLimit, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(
//!     RateLimitConfig::new(10, 20).with_path_limit("/api/v2/order", PathLimit::new(5, 10)),
//! );
//! assert_eq!(limiter.bucket_key("/api/v2/order/get_order_list"), "/api/v2/order");
//! assert_eq!(limiter.bucket_key("/api/v2/shop/get_shop_info"), "default");
//! ```

mod batch;
mod errors;
pub(crate) mod http_client;
mod http_request;
mod http_response;
mod marketplace;
mod rate_limit;
mod retry;

pub use batch::{BatchRunner, DEFAULT_BATCH_CONCURRENCY};
pub use errors::{ApiError, ClientError, ErrorCategory, ErrorCode, InvalidRequestError, Retryable};
pub use http_client::{ApiClient, SDK_VERSION};
pub use http_request::{
    HttpMethod, MultipartUpload, Request, RequestBody, RequestBuilder, RESERVED_QUERY_PARAMS,
    UPLOAD_IMAGE_FIELD, UPLOAD_IMAGE_PATH,
};
pub use http_response::{BaseResponse, Response};
pub use marketplace::{MarketplaceClient, MarketplaceRegistry};
pub use rate_limit::{BucketStatus, PathLimit, RateLimitConfig, RateLimiter, DEFAULT_BUCKET};
pub use retry::{
    Executor, RetryPolicy, RetryResult, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
