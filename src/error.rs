//! Error types for client configuration.
//!
//! This module contains the error type returned while building a
//! [`MarketplaceConfig`](crate::MarketplaceConfig) or one of its validated
//! newtypes.
//!
//! # Error Handling
//!
//! All configuration constructors return `Result<T, ConfigError>` to enable
//! fail-fast validation. A client can never be constructed from a partial or
//! degenerate configuration (for example an empty partner key, which would
//! silently produce signatures the platform rejects).
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::{ConfigError, PartnerKey};
//!
//! let result = PartnerKey::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyPartnerKey)));
//! ```

use thiserror::Error;

/// Errors that can occur during client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Partner key cannot be empty.
    #[error("Partner key cannot be empty. Please provide the partner key issued by the Open Platform.")]
    EmptyPartnerKey,

    /// Partner ID is not a positive integer.
    #[error("Invalid partner ID '{value}'. Expected a positive integer.")]
    InvalidPartnerId {
        /// The invalid value that was provided.
        value: String,
    },

    /// Base URL is invalid.
    #[error("Invalid base URL '{url}'. Please provide a URL with scheme (e.g., 'https://partner.example.com').")]
    InvalidBaseUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// A rate limit entry is unusable.
    #[error("Invalid rate limit for '{prefix}': {reason}")]
    InvalidRateLimit {
        /// The path prefix (or `default`) the limit belongs to.
        prefix: String,
        /// Why the limit was rejected.
        reason: String,
    },

    /// The retry policy is unusable.
    #[error("Invalid retry policy: {reason}")]
    InvalidRetryPolicy {
        /// Why the policy was rejected.
        reason: String,
    },

    /// The underlying HTTP client could not be created.
    #[error("Failed to initialize HTTP client: {reason}")]
    HttpClient {
        /// The error reported while building the client.
        reason: String,
    },
}
