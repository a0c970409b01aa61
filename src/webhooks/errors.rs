//! Error types for inbound webhook handling.
//!
//! - [`WebhookError::MissingCallbackUrl`]: no callback URL to verify against
//! - [`WebhookError::MissingSignature`]: the `Authorization` header is absent
//! - [`WebhookError::InvalidSignature`]: the signature does not match the body
//! - [`WebhookError::MalformedPayload`]: the body is not a valid push envelope
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::webhooks::WebhookError;
//!
//! let error = WebhookError::InvalidSignature;
//! assert!(error.to_string().contains("signature"));
//! ```

use thiserror::Error;

/// Error type for webhook verification and decoding.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The configuration carries no webhook callback URL.
    ///
    /// The callback URL is part of the signed message, so verification is
    /// impossible without it.
    #[error("Webhook callback URL is not configured. Please set webhook_url in MarketplaceConfig.")]
    MissingCallbackUrl,

    /// The request carried no signature.
    #[error("Webhook request is missing the Authorization signature header")]
    MissingSignature,

    /// Signature verification failed.
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// The body could not be decoded as a push envelope or typed payload.
    #[error("Malformed webhook payload: {reason}")]
    MalformedPayload {
        /// Why decoding failed.
        reason: String,
    },
}

impl From<serde_json::Error> for WebhookError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedPayload {
            reason: error.to_string(),
        }
    }
}
