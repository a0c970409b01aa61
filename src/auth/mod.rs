//! Authentication types for marketplace Open Platform calls.
//!
//! This module provides request signing, shop credentials and the machinery
//! that keeps access tokens fresh.
//!
//! # Overview
//!
//! - [`Signer`]: HMAC-SHA256 signatures for requests and webhooks
//! - [`Credential`]: Access token, refresh token, shop ID and expiry
//! - [`CredentialState`]: Concurrency-safe owner of one credential, with
//!   single-flight refresh
//! - [`Refresher`]: Exchanges a refresh token for a new token pair
//! - [`TokenPersister`]: Stores refreshed tokens outside the process
//! - [`OpenPlatformRefresher`]: [`Refresher`] backed by the token endpoint
//!
//! # Token Lifetime
//!
//! Access tokens are short-lived (hours) and refresh tokens last for weeks.
//! A client refreshes proactively when the access token is within
//! [`DEFAULT_REFRESH_BUFFER`] of expiry, and reactively when the platform
//! reports an expired token.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use marketplace_api::auth::{Credential, CredentialState};
//!
//! let credential = Credential::new("access-token", 55001)
//!     .with_refresh_token("refresh-token")
//!     .with_expires_at(Utc::now() + Duration::hours(4));
//!
//! let state = CredentialState::new(credential);
//! assert!(state.snapshot().has_refresh_token());
//! assert!(!state.has_refresher());
//! ```

mod credential;
mod refresh;
mod signer;

pub use credential::{
    BoxError, Credential, CredentialError, CredentialState, RefreshedTokens, Refresher,
    TokenPersister, DEFAULT_REFRESH_BUFFER,
};
pub use refresh::{OpenPlatformRefresher, REFRESH_TOKEN_PATH};
pub use signer::{constant_time_compare, Signer};
