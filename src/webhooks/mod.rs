//! Inbound push notifications.
//!
//! The marketplace pushes events (order status changes, tracking updates,
//! shop authorisation, ...) to a callback URL registered in the partner
//! console. This module authenticates those calls and decodes their bodies.
//!
//! # Overview
//!
//! - [`WebhookVerifier`]: Checks the `Authorization` signature and decodes bodies
//! - [`WebhookRequest`]: Raw body plus signature as received by an HTTP handler
//! - [`WebhookEvent`]: A decoded push with its [`PushCode`] and [`WebhookPayload`]
//! - [`timestamp_within_window`]: Replay check callers may apply
//! - [`WebhookError`]: Error types for verification and decoding
//!
//! # Error Handling
//!
//! ```rust
//! use marketplace_api::webhooks::WebhookError;
//!
//! fn status_for(error: &WebhookError) -> u16 {
//!     match error {
//!         WebhookError::MissingSignature | WebhookError::InvalidSignature => 401,
//!         WebhookError::MalformedPayload { .. } => 400,
//!         WebhookError::MissingCallbackUrl => 500,
//!     }
//! }
//!
//! assert_eq!(status_for(&WebhookError::InvalidSignature), 401);
//! ```
//!
//! # Thread Safety
//!
//! All types in this module are `Send + Sync`, so a single verifier can be
//! shared across request handlers.

mod errors;
mod types;
mod verification;

pub use errors::WebhookError;
pub use types::{
    OrderStatusData, PushCode, ShopAuthorizationData, TrackingUpdateData, WebhookEvent,
    WebhookPayload,
};
pub use verification::{
    timestamp_within_window, WebhookRequest, WebhookVerifier, HEADER_AUTHORIZATION,
    MAX_TIMESTAMP_DRIFT,
};

// Verify types are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookVerifier>();
    assert_send_sync::<WebhookEvent>();
    assert_send_sync::<WebhookError>();
};
