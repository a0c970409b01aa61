//! Error types for marketplace API calls.
//!
//! This module turns heterogeneous failure signals (platform error codes in
//! the response envelope, HTTP status codes, transport failures) into one
//! structured shape with derived semantics.
//!
//! # Error Handling
//!
//! - [`ApiError`]: A platform or HTTP-level failure, with a derived
//!   [`ErrorCategory`] and retryability
//! - [`InvalidRequestError`]: A request rejected before it was sent
//! - [`ClientError`]: Unified error type returned by the client
//! - [`Retryable`]: How the retry executor inspects an error
//!
//! # Classification
//!
//! | Category         | Codes                                                          | Retryable |
//! |------------------|----------------------------------------------------------------|-----------|
//! | `authentication` | `error_auth`, `error_sign`, `error_timestamp`, `error_permission` | no     |
//! | `validation`     | `error_param`                                                  | no        |
//! | `rate_limit`     | `error_exceed_limit`                                           | yes       |
//! | `server`         | `error_server`                                                 | yes       |
//! | `not_found`      | `error_not_found`, `error_product_banned`, `error_order_cancelled` | no    |
//! | `unknown`        | anything else                                                  | no        |
//!
//! Independently of the code, an HTTP status of 429, 503 or any 5xx makes an
//! error retryable. Network failures are retried too, but a request that
//! reqwest could not build is not.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::clients::{ApiError, ErrorCategory, ErrorCode};
//!
//! let error = ApiError::new(ErrorCode::ExceedLimit, "too many requests", 200);
//! assert_eq!(error.category(), ErrorCategory::RateLimit);
//! assert!(error.is_retryable());
//!
//! let error = ApiError::new(ErrorCode::Param, "bad item_id", 400);
//! assert!(!error.is_retryable());
//! ```

use std::fmt;

use thiserror::Error;

use crate::auth::CredentialError;
use crate::error::ConfigError;

/// Message fragments that mark an `error_auth` response as an expired or
/// revoked access token.
const TOKEN_EXPIRED_MARKERS: &[&str] = &["token expired", "invalid token", "access_token invalid"];

/// Message fragments that mark an `error_param` response as a dead refresh token.
const REFRESH_TOKEN_EXPIRED_MARKERS: &[&str] = &["refresh_token", "invalid refresh"];

/// Platform error codes carried in the `error` field of the response envelope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `error_auth`
    Auth,
    /// `error_sign`
    Sign,
    /// `error_timestamp`
    Timestamp,
    /// `error_permission`
    Permission,
    /// `error_param`
    Param,
    /// `error_exceed_limit`
    ExceedLimit,
    /// `error_server`
    Server,
    /// `error_not_found`
    NotFound,
    /// `error_product_banned`
    ProductBanned,
    /// `error_order_cancelled`
    OrderCancelled,
    /// Any code not in the table above.
    Other(String),
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auth => "error_auth",
            Self::Sign => "error_sign",
            Self::Timestamp => "error_timestamp",
            Self::Permission => "error_permission",
            Self::Param => "error_param",
            Self::ExceedLimit => "error_exceed_limit",
            Self::Server => "error_server",
            Self::NotFound => "error_not_found",
            Self::ProductBanned => "error_product_banned",
            Self::OrderCancelled => "error_order_cancelled",
            Self::Other(code) => code,
        }
    }

    /// Returns the category this code belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth | Self::Sign | Self::Timestamp | Self::Permission => {
                ErrorCategory::Authentication
            }
            Self::ExceedLimit => ErrorCategory::RateLimit,
            Self::Server => ErrorCategory::Server,
            Self::NotFound | Self::ProductBanned | Self::OrderCancelled => ErrorCategory::NotFound,
            Self::Param => ErrorCategory::Validation,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "error_auth" => Self::Auth,
            "error_sign" => Self::Sign,
            "error_timestamp" => Self::Timestamp,
            "error_permission" => Self::Permission,
            "error_param" => Self::Param,
            "error_exceed_limit" => Self::ExceedLimit,
            "error_server" => Self::Server,
            "error_not_found" => Self::NotFound,
            "error_product_banned" => Self::ProductBanned,
            "error_order_cancelled" => Self::OrderCancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`ApiError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credentials, signature, timestamp or permission problems.
    Authentication,
    /// The platform throttled the call.
    RateLimit,
    /// The platform failed internally.
    Server,
    /// The target resource does not exist or is unavailable.
    NotFound,
    /// The request parameters were rejected.
    Validation,
    /// Unrecognized error code.
    Unknown,
}

impl ErrorCategory {
    /// Returns the snake_case name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` for categories that are safe to retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Server)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure reported by the marketplace.
///
/// Constructed once per failed attempt and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    /// Platform error code.
    pub code: ErrorCode,
    /// Human-readable message from the platform.
    pub message: String,
    /// Platform request ID, if one was returned.
    pub request_id: Option<String>,
    /// HTTP status code of the response.
    pub http_status: u16,
}

impl ApiError {
    /// Creates an error without a request ID.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
            http_status,
        }
    }

    /// Attaches the platform request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        self.request_id = (!request_id.is_empty()).then_some(request_id);
        self
    }

    /// Returns the category derived from the error code.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns `true` if this error is safe to retry.
    ///
    /// The category decides first; an HTTP status of 429, 503 or any 5xx
    /// makes the error retryable even when the code says otherwise.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.category().is_retryable()
            || self.http_status == 429
            || self.http_status == 503
            || self.http_status >= 500
    }

    /// Returns `true` if this is an authentication failure caused by an
    /// expired or revoked access token.
    ///
    /// Only `error_auth` responses whose message mentions the token qualify;
    /// signature or permission failures are not fixed by a refresh.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.code == ErrorCode::Auth && contains_any(&self.message, TOKEN_EXPIRED_MARKERS)
    }

    /// Returns `true` if the refresh token itself has been rejected.
    #[must_use]
    pub fn is_refresh_token_expired(&self) -> bool {
        self.code == ErrorCode::Param && contains_any(&self.message, REFRESH_TOKEN_EXPIRED_MARKERS)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_id {
            Some(request_id) => write!(
                f,
                "marketplace [{}]: {} (request_id: {request_id})",
                self.code, self.message
            ),
            None => write!(f, "marketplace [{}]: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

fn contains_any(message: &str, markers: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    markers.iter().any(|marker| message.contains(marker))
}

/// Error returned when a request fails validation before it is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidRequestError {
    /// The path does not start with `/`.
    #[error("Request path '{path}' must start with '/'.")]
    RelativePath {
        /// The path that was provided.
        path: String,
    },

    /// A POST or PUT request was made without a body.
    #[error("Cannot use {method} without specifying data.")]
    MissingBody {
        /// The HTTP method that requires a body.
        method: String,
    },

    /// A multipart body was attached to a method other than POST.
    #[error("Multipart uploads must use post, not {method}.")]
    MultipartMethod {
        /// The HTTP method that was provided.
        method: String,
    },

    /// A multipart upload declares a MIME type that cannot be sent.
    #[error("Invalid MIME type '{mime_type}' for multipart upload.")]
    InvalidMimeType {
        /// The MIME type that was provided.
        mime_type: String,
    },

    /// A caller-supplied query parameter collides with a signing parameter.
    #[error("Query parameter '{name}' is reserved for request signing.")]
    ReservedQueryParam {
        /// The reserved parameter name.
        name: String,
    },
}

/// Unified error type for all client operations.
///
/// # Example
///
/// ```rust,ignore
/// use marketplace_api::clients::ClientError;
///
/// match client.execute(&cancel, &request).await {
///     Ok(response) => println!("{}", response.body),
///     Err(ClientError::Api(e)) => println!("{} ({})", e, e.category()),
///     Err(ClientError::Cancelled) => println!("caller gave up"),
///     Err(other) => println!("{other}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ClientError {
    /// The marketplace reported an error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Network or connection failure (DNS, connect, reset, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A request body or response could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request was rejected before sending.
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequestError),

    /// Credential refresh could not be performed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Credentials were refreshed after a token-expired failure; the attempt
    /// should be repeated with the new token.
    #[error("credentials refreshed after: {original}")]
    CredentialsRefreshed {
        /// The token-expired error that triggered the refresh.
        original: ApiError,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The client configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No client is registered for the requested platform.
    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform {
        /// The platform name that was looked up.
        platform: String,
    },
}

impl ClientError {
    /// Returns the [`ApiError`] if this is a platform failure.
    #[must_use]
    pub const fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) | Self::CredentialsRefreshed { original: error } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if the operation was cancelled by the caller.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// How the retry executor inspects failures.
pub trait Retryable {
    /// Returns `true` if another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// Builds the error reported when the caller cancels.
    fn cancelled() -> Self;

    /// Returns `true` if the next attempt should start without backoff.
    fn retry_immediately(&self) -> bool {
        false
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Api(error) => error.is_retryable(),
            // Builder errors mean the request could never be sent.
            Self::Transport(error) => !error.is_builder(),
            Self::CredentialsRefreshed { .. } => true,
            _ => false,
        }
    }

    fn cancelled() -> Self {
        Self::Cancelled
    }

    fn retry_immediately(&self) -> bool {
        matches!(self, Self::CredentialsRefreshed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trips_through_wire_string() {
        for code in [
            "error_auth",
            "error_sign",
            "error_timestamp",
            "error_permission",
            "error_param",
            "error_exceed_limit",
            "error_server",
            "error_not_found",
            "error_product_banned",
            "error_order_cancelled",
            "error_something_new",
        ] {
            assert_eq!(ErrorCode::from(code).as_str(), code);
        }
    }

    #[test]
    fn test_category_table() {
        use ErrorCategory::*;
        let cases = [
            ("error_auth", Authentication),
            ("error_sign", Authentication),
            ("error_timestamp", Authentication),
            ("error_permission", Authentication),
            ("error_param", Validation),
            ("error_exceed_limit", RateLimit),
            ("error_server", Server),
            ("error_not_found", NotFound),
            ("error_product_banned", NotFound),
            ("error_order_cancelled", NotFound),
            ("error_mystery", Unknown),
        ];
        for (code, category) in cases {
            assert_eq!(ErrorCode::from(code).category(), category, "{code}");
        }
    }

    #[test]
    fn test_retryable_by_category() {
        assert!(ApiError::new(ErrorCode::ExceedLimit, "", 200).is_retryable());
        assert!(ApiError::new(ErrorCode::Server, "", 200).is_retryable());
        assert!(!ApiError::new(ErrorCode::Param, "", 400).is_retryable());
        assert!(!ApiError::new(ErrorCode::NotFound, "", 404).is_retryable());
        assert!(!ApiError::new(ErrorCode::Auth, "", 403).is_retryable());
    }

    #[test]
    fn test_http_status_overrides_category() {
        assert!(ApiError::new(ErrorCode::Param, "", 429).is_retryable());
        assert!(ApiError::new(ErrorCode::Auth, "", 503).is_retryable());
        assert!(ApiError::new(ErrorCode::NotFound, "", 502).is_retryable());
        assert!(!ApiError::new(ErrorCode::NotFound, "", 404).is_retryable());
    }

    #[test]
    fn test_token_expired_requires_auth_code_and_marker() {
        assert!(ApiError::new(ErrorCode::Auth, "access_token invalid", 403).is_token_expired());
        assert!(ApiError::new(ErrorCode::Auth, "Token expired", 403).is_token_expired());
        assert!(ApiError::new(ErrorCode::Auth, "invalid token supplied", 403).is_token_expired());
        assert!(!ApiError::new(ErrorCode::Auth, "no permission", 403).is_token_expired());
        assert!(!ApiError::new(ErrorCode::Sign, "token expired", 403).is_token_expired());
    }

    #[test]
    fn test_token_expired_does_not_change_retryability() {
        let error = ApiError::new(ErrorCode::Auth, "token expired", 403);
        assert!(error.is_token_expired());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_refresh_token_expired() {
        assert!(ApiError::new(ErrorCode::Param, "invalid refresh_token", 400)
            .is_refresh_token_expired());
        assert!(!ApiError::new(ErrorCode::Param, "bad item_id", 400).is_refresh_token_expired());
    }

    #[test]
    fn test_display_includes_request_id_when_present() {
        let error = ApiError::new(ErrorCode::Server, "boom", 500).with_request_id("req-1");
        assert_eq!(
            error.to_string(),
            "marketplace [error_server]: boom (request_id: req-1)"
        );

        let error = ApiError::new(ErrorCode::Server, "boom", 500).with_request_id("");
        assert!(error.request_id.is_none());
        assert_eq!(error.to_string(), "marketplace [error_server]: boom");
    }

    #[test]
    fn test_client_error_retryability() {
        assert!(ClientError::Api(ApiError::new(ErrorCode::Server, "", 500)).is_retryable());
        assert!(!ClientError::Api(ApiError::new(ErrorCode::Param, "", 400)).is_retryable());
        assert!(ClientError::CredentialsRefreshed {
            original: ApiError::new(ErrorCode::Auth, "token expired", 403)
        }
        .is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
        assert!(!ClientError::Credential(CredentialError::NoRefresher).is_retryable());
    }

    #[test]
    fn test_transport_builder_errors_are_not_retryable() {
        let builder_error = reqwest::multipart::Part::bytes(Vec::new())
            .mime_str("not a mime")
            .unwrap_err();
        assert!(builder_error.is_builder());
        assert!(!ClientError::Transport(builder_error).is_retryable());
    }

    #[test]
    fn test_only_refreshed_credentials_skip_backoff() {
        assert!(ClientError::CredentialsRefreshed {
            original: ApiError::new(ErrorCode::Auth, "token expired", 403)
        }
        .retry_immediately());
        assert!(!ClientError::Api(ApiError::new(ErrorCode::Server, "", 500)).retry_immediately());
    }

    #[test]
    fn test_as_api_error() {
        let error = ClientError::Api(ApiError::new(ErrorCode::Param, "x", 400));
        assert_eq!(error.as_api_error().unwrap().code, ErrorCode::Param);
        assert!(ClientError::Cancelled.as_api_error().is_none());
        assert!(ClientError::cancelled().is_cancelled());
    }

    #[test]
    fn test_invalid_request_messages() {
        assert_eq!(
            InvalidRequestError::MissingBody {
                method: "post".to_string()
            }
            .to_string(),
            "Cannot use post without specifying data."
        );
        assert!(InvalidRequestError::ReservedQueryParam {
            name: "sign".to_string()
        }
        .to_string()
        .contains("sign"));
    }
}
