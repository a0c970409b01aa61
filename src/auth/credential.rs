//! Shop credentials and the state that coordinates refreshing them.
//!
//! [`Credential`] is the token triple (access token, refresh token, shop ID)
//! plus expiry. [`CredentialState`] owns one credential for one client and is
//! the only place it is mutated.
//!
//! # Refresh coordination
//!
//! Refreshes are serialized behind an async gate. A caller that observed a
//! token-expired failure passes the access token it used to
//! [`CredentialState::refresh_if_stale`]; if another caller already swapped in
//! a new token while it waited for the gate, no second refresh is made.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::auth::{Credential, CredentialState};
//!
//! let state = CredentialState::new(Credential::new("access", 42).with_refresh_token("refresh"));
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.access_token, "access");
//! assert_eq!(snapshot.shop_id, 42);
//! assert!(!snapshot.is_expired());
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Boxed error returned by refresher and persister implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How long before expiry a credential is considered due for refresh.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Access and refresh tokens for one shop.
///
/// Token values are masked in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Token sent as `access_token` on authenticated calls.
    pub access_token: String,
    /// Token exchanged for a new access token.
    pub refresh_token: String,
    /// The shop the tokens belong to.
    pub shop_id: i64,
    /// When the access token expires, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a credential without a refresh token or known expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>, shop_id: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: String::new(),
            shop_id,
            expires_at: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    /// Sets the access token expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns `true` if the access token has expired.
    ///
    /// Credentials without a known expiry never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() >= expires_at)
    }

    /// Returns `true` if the access token expires within `buffer`.
    #[must_use]
    pub fn needs_refresh(&self, buffer: Duration) -> bool {
        self.time_until_expiry()
            .is_some_and(|remaining| remaining <= buffer)
    }

    /// Returns how long until the access token expires.
    ///
    /// `None` if the expiry is unknown; zero if it has already passed.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Returns `true` if there is a refresh token to exchange.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |token: &str| if token.is_empty() { "" } else { "*****" };
        f.debug_struct("Credential")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &mask(&self.refresh_token))
            .field("shop_id", &self.shop_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens returned by a [`Refresher`].
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    /// The new access token.
    pub access_token: String,
    /// The new refresh token. Empty keeps the current one.
    pub refresh_token: String,
    /// Lifetime of the new access token.
    pub expires_in: Duration,
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("access_token", &"*****")
            .field("refresh_token", &"*****")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Performs the exchange.
    async fn refresh_token(
        &self,
        refresh_token: &str,
        shop_id: i64,
    ) -> Result<RefreshedTokens, BoxError>;
}

/// Stores refreshed tokens so they survive restarts.
#[async_trait]
pub trait TokenPersister: Send + Sync {
    /// Saves the tokens for a marketplace connection.
    async fn persist_tokens(
        &self,
        connection_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BoxError>;
}

/// Errors from [`CredentialState`] refresh operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No [`Refresher`] has been configured.
    #[error("Token refresh is not configured for this client.")]
    NoRefresher,

    /// The credential has no refresh token.
    #[error("No refresh token is available.")]
    NoRefreshToken,

    /// The refresher reported a failure.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] BoxError),

    /// The caller cancelled while the refresh was pending.
    #[error("Token refresh was cancelled.")]
    Cancelled,
}

struct PersisterBinding {
    connection_id: String,
    persister: Arc<dyn TokenPersister>,
}

/// Concurrency-safe holder of one [`Credential`].
///
/// # Thread Safety
///
/// Reads for request signing take a shared lock and never block each other.
/// Writes happen only in `set_tokens*` and after a successful refresh.
pub struct CredentialState {
    credential: RwLock<Credential>,
    refresher: RwLock<Option<Arc<dyn Refresher>>>,
    persister: RwLock<Option<PersisterBinding>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

// Verify CredentialState is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CredentialState>();
};

impl Default for CredentialState {
    fn default() -> Self {
        Self::new(Credential::default())
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("credential", &*self.read())
            .field("has_refresher", &self.has_refresher())
            .finish_non_exhaustive()
    }
}

impl CredentialState {
    /// Creates a state holding `credential`.
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(credential),
            refresher: RwLock::new(None),
            persister: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns a consistent copy of the current credential.
    #[must_use]
    pub fn snapshot(&self) -> Credential {
        self.read().clone()
    }

    /// Replaces the access token and shop ID, keeping the refresh token and
    /// clearing the expiry.
    pub fn set_tokens(&self, access_token: impl Into<String>, shop_id: i64) {
        let mut credential = self.write();
        credential.access_token = access_token.into();
        credential.shop_id = shop_id;
        credential.expires_at = None;
    }

    /// Replaces the whole credential.
    pub fn set_tokens_with_refresh(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        shop_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) {
        *self.write() = Credential {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            shop_id,
            expires_at,
        };
    }

    /// Installs the capability used to refresh tokens.
    pub fn set_refresher(&self, refresher: Arc<dyn Refresher>) {
        *self
            .refresher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(refresher);
    }

    /// Installs the collaborator that stores tokens after each refresh.
    pub fn set_persister(&self, connection_id: impl Into<String>, persister: Arc<dyn TokenPersister>) {
        *self
            .persister
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(PersisterBinding {
            connection_id: connection_id.into(),
            persister,
        });
    }

    /// Returns `true` if a refresher is configured.
    #[must_use]
    pub fn has_refresher(&self) -> bool {
        self.refresher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Refreshes the credential unconditionally.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NoRefresher`] / [`CredentialError::NoRefreshToken`]
    ///   if refreshing is impossible
    /// - [`CredentialError::RefreshFailed`] if the refresher fails
    /// - [`CredentialError::Cancelled`] if `cancel` fires first
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<(), CredentialError> {
        let _gate = self.enter_gate(cancel).await?;
        self.refresh_locked(cancel).await
    }

    /// Refreshes the credential unless its access token has already changed
    /// from `stale_access_token`.
    ///
    /// Returns `true` if this call performed the refresh.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_if_stale(
        &self,
        cancel: &CancellationToken,
        stale_access_token: &str,
    ) -> Result<bool, CredentialError> {
        self.ensure_refreshable()?;
        let _gate = self.enter_gate(cancel).await?;
        if self.read().access_token != stale_access_token {
            tracing::debug!("access token already refreshed by another caller");
            return Ok(false);
        }
        self.refresh_locked(cancel).await.map(|()| true)
    }

    /// Refreshes the credential if it expires within `buffer`.
    ///
    /// Returns `true` if a refresh was performed.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_if_expiring(
        &self,
        cancel: &CancellationToken,
        buffer: Duration,
    ) -> Result<bool, CredentialError> {
        if !self.read().needs_refresh(buffer) {
            return Ok(false);
        }
        let _gate = self.enter_gate(cancel).await?;
        if !self.read().needs_refresh(buffer) {
            return Ok(false);
        }
        self.refresh_locked(cancel).await.map(|()| true)
    }

    fn ensure_refreshable(&self) -> Result<Arc<dyn Refresher>, CredentialError> {
        let refresher = self
            .refresher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CredentialError::NoRefresher)?;
        if !self.read().has_refresh_token() {
            return Err(CredentialError::NoRefreshToken);
        }
        Ok(refresher)
    }

    async fn enter_gate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, CredentialError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CredentialError::Cancelled),
            guard = self.refresh_gate.lock() => Ok(guard),
        }
    }

    /// Performs the refresh. The caller must hold the refresh gate.
    async fn refresh_locked(&self, cancel: &CancellationToken) -> Result<(), CredentialError> {
        let refresher = self.ensure_refreshable()?;
        let current = self.snapshot();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CredentialError::Cancelled),
            result = refresher.refresh_token(&current.refresh_token, current.shop_id) => result,
        };
        let tokens = result.map_err(|error| {
            tracing::warn!(shop_id = current.shop_id, error = %error, "token refresh failed");
            CredentialError::RefreshFailed(error)
        })?;

        let issued = TimeDelta::from_std(tokens.expires_in)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let updated = {
            let mut credential = self.write();
            // Expiry never moves backwards across refreshes.
            let expires_at = credential
                .expires_at
                .map_or(issued, |previous| previous.max(issued));
            credential.access_token = tokens.access_token;
            if !tokens.refresh_token.is_empty() {
                credential.refresh_token = tokens.refresh_token;
            }
            credential.expires_at = Some(expires_at);
            credential.clone()
        };

        tracing::info!(
            shop_id = updated.shop_id,
            expires_at = ?updated.expires_at,
            "access token refreshed"
        );

        self.persist(cancel, &updated).await;
        Ok(())
    }

    async fn persist(&self, cancel: &CancellationToken, credential: &Credential) {
        let binding = {
            let guard = self.persister.read().unwrap_or_else(PoisonError::into_inner);
            guard
                .as_ref()
                .map(|b| (b.connection_id.clone(), Arc::clone(&b.persister)))
        };
        let (Some((connection_id, persister)), Some(expires_at)) = (binding, credential.expires_at)
        else {
            return;
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(connection_id = %connection_id, "token persistence skipped: cancelled");
                return;
            }
            result = persister.persist_tokens(
                &connection_id,
                &credential.access_token,
                &credential.refresh_token,
                expires_at,
            ) => result,
        };

        if let Err(error) = result {
            tracing::warn!(connection_id = %connection_id, error = %error, "failed to persist refreshed tokens");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Credential> {
        self.credential.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credential> {
        self.credential.write().unwrap_or_else(PoisonError::into_inner)
    }
}
