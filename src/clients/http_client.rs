//! The marketplace API client.
//!
//! [`ApiClient`] composes signing, rate limiting, retries and credential
//! refresh into a single [`execute`](ApiClient::execute) call.
//!
//! # Attempt pipeline
//!
//! Each attempt, driven by the retry [`Executor`]:
//!
//! 1. waits on the [`RateLimiter`] bucket for the request path
//! 2. takes a credential snapshot and builds the signed URL
//! 3. sends the request (JSON or multipart)
//! 4. classifies the response envelope and HTTP status into an [`ApiError`]
//!
//! A token-expired failure on an authenticated call triggers one credential
//! refresh per `execute`. On success the attempt reports
//! [`ClientError::CredentialsRefreshed`], which the executor retries like any
//! other transient failure; if the refresh fails the original error is
//! returned without further attempts.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    Credential, CredentialError, CredentialState, Refresher, Signer, TokenPersister,
    DEFAULT_REFRESH_BUFFER,
};
use crate::clients::errors::{ApiError, ClientError};
use crate::clients::http_request::{Request, RequestBody};
use crate::clients::http_response::Response;
use crate::clients::rate_limit::RateLimiter;
use crate::clients::retry::Executor;
use crate::config::MarketplaceConfig;
use crate::error::ConfigError;

/// SDK version from Cargo.toml.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of response characters written to debug logs.
const LOG_BODY_LIMIT: usize = 500;

/// Client for one marketplace connection.
///
/// # Thread Safety
///
/// `ApiClient` is `Send + Sync`. Share it behind an `Arc`; concurrent calls
/// are independent apart from the shared rate limiter buckets and credential.
///
/// # Example
///
/// ```rust,ignore
/// use marketplace_api::{ApiClient, MarketplaceConfig, PartnerId, PartnerKey};
/// use marketplace_api::auth::Credential;
/// use marketplace_api::clients::{HttpMethod, Request};
/// use tokio_util::sync::CancellationToken;
///
/// let config = MarketplaceConfig::builder()
///     .partner_id(PartnerId::new(2_001_234).unwrap())
///     .partner_key(PartnerKey::new("partner-key").unwrap())
///     .build()?;
///
/// let client = ApiClient::new(config)?
///     .with_credentials(Credential::new("access-token", 55_001).with_refresh_token("refresh"));
///
/// let request = Request::builder(HttpMethod::Get, "/api/v2/shop/get_shop_info")
///     .authenticated()
///     .build()?;
///
/// let response = client.execute(&CancellationToken::new(), &request).await?;
/// println!("{:?}", response.response_field());
/// ```
#[derive(Debug)]
pub struct ApiClient {
    config: MarketplaceConfig,
    http: reqwest::Client,
    signer: Signer,
    credentials: CredentialState,
    rate_limiter: RateLimiter,
    executor: Executor,
    refresh_buffer: Duration,
}

// Verify ApiClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ApiClient>();
};

impl ApiClient {
    /// Creates a client without credentials.
    ///
    /// Public (unauthenticated) calls work immediately; install a credential
    /// with [`with_credentials`](Self::with_credentials) before making
    /// authenticated calls.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: MarketplaceConfig) -> Result<Self, ConfigError> {
        let http = build_http_client(&config)?;
        Ok(Self {
            signer: Signer::new(config.partner_key()),
            rate_limiter: RateLimiter::new(config.rate_limit().clone()),
            executor: Executor::new(*config.retry_policy()),
            credentials: CredentialState::default(),
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            http,
            config,
        })
    }

    /// Installs the shop credential.
    #[must_use]
    pub fn with_credentials(self, credential: Credential) -> Self {
        self.credentials.set_tokens_with_refresh(
            credential.access_token,
            credential.refresh_token,
            credential.shop_id,
            credential.expires_at,
        );
        self
    }

    /// Installs the capability used to refresh expired tokens.
    #[must_use]
    pub fn with_refresher(self, refresher: Arc<dyn Refresher>) -> Self {
        self.credentials.set_refresher(refresher);
        self
    }

    /// Installs the collaborator that stores refreshed tokens.
    #[must_use]
    pub fn with_persister(
        self,
        connection_id: impl Into<String>,
        persister: Arc<dyn TokenPersister>,
    ) -> Self {
        self.credentials.set_persister(connection_id, persister);
        self
    }

    /// Sets how long before expiry tokens are refreshed proactively.
    #[must_use]
    pub const fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Returns the platform name.
    #[must_use]
    pub fn platform(&self) -> &str {
        self.config.platform()
    }

    /// Returns the credential state.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialState {
        &self.credentials
    }

    /// Returns the rate limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Returns the request signer.
    #[must_use]
    pub const fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Builds the signed URL for one attempt.
    ///
    /// The query string contains the caller's parameters plus `partner_id`,
    /// `timestamp`, `sign` and, for authenticated requests, `access_token`
    /// and `shop_id`, sorted by name.
    #[must_use]
    pub fn build_url(&self, request: &Request, credential: &Credential, timestamp: i64) -> String {
        let partner_id = self.config.partner_id().get();
        let mut params: BTreeMap<&str, String> = request
            .query
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();

        let sign = if request.need_auth {
            params.insert("access_token", credential.access_token.clone());
            params.insert("shop_id", credential.shop_id.to_string());
            self.signer.generate_authenticated(
                partner_id,
                &request.path,
                timestamp,
                &credential.access_token,
                credential.shop_id,
            )
        } else {
            self.signer
                .generate_public(partner_id, &request.path, timestamp)
        };

        params.insert("partner_id", partner_id.to_string());
        params.insert("timestamp", timestamp.to_string());
        params.insert("sign", sign);

        signed_url(self.config.base_url().as_ref(), &request.path, &params)
    }

    /// Sends a request with rate limiting, retries and token refresh.
    ///
    /// A token-expired failure triggers at most one refresh per call. The
    /// repeat attempt comes out of the policy's `max_attempts`, so a refresh
    /// on the last attempt only updates the stored credentials and the
    /// original error is returned. The next call uses the new token.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidRequest`] if the request fails validation
    /// - [`ClientError::Api`] for platform or HTTP failures that were not
    ///   retried, or that persisted through every attempt
    /// - [`ClientError::Transport`] for network failures that persisted
    /// - [`ClientError::Cancelled`] if `cancel` fires at any point
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, ClientError> {
        request.verify()?;

        if request.need_auth {
            self.refresh_proactively(cancel).await?;
        }

        let refreshed = AtomicBool::new(false);
        let refreshed = &refreshed;
        let result = self
            .executor
            .execute(cancel, move |attempt| {
                self.attempt(cancel, request, attempt, refreshed)
            })
            .await;

        let attempts = result.attempts;
        let duration = result.duration;
        match result.into_result() {
            Ok(response) => Ok(response),
            Err(ClientError::Cancelled) => {
                tracing::debug!(path = %request.path, attempts, "marketplace request cancelled");
                Err(ClientError::Cancelled)
            }
            Err(error) => {
                // A refresh on the final attempt leaves nothing to retry with.
                let error = match error {
                    ClientError::CredentialsRefreshed { original } => ClientError::Api(original),
                    other => other,
                };
                tracing::error!(
                    path = %request.path,
                    attempts,
                    duration_ms = duration.as_millis(),
                    error = %error,
                    "marketplace request failed after retries"
                );
                Err(error)
            }
        }
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        request: &Request,
        attempt: u32,
        refreshed: &AtomicBool,
    ) -> Result<Response, ClientError> {
        let credential = self.credentials.snapshot();
        let error = match self.send_once(cancel, request, &credential, attempt).await {
            Err(ClientError::Api(error)) if request.need_auth && error.is_token_expired() => error,
            other => return other,
        };

        if refreshed.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Api(error));
        }

        match self
            .credentials
            .refresh_if_stale(cancel, &credential.access_token)
            .await
        {
            Ok(_) => Err(ClientError::CredentialsRefreshed { original: error }),
            Err(CredentialError::Cancelled) => Err(ClientError::Cancelled),
            Err(refresh_error) => {
                tracing::warn!(
                    path = %request.path,
                    error = %refresh_error,
                    "failed to refresh token"
                );
                Err(ClientError::Api(error))
            }
        }
    }

    async fn send_once(
        &self,
        cancel: &CancellationToken,
        request: &Request,
        credential: &Credential,
        attempt: u32,
    ) -> Result<Response, ClientError> {
        let form = match &request.body {
            Some(RequestBody::Multipart(upload)) => Some(upload.to_form()?),
            _ => None,
        };

        self.rate_limiter.wait(cancel, &request.path).await?;

        let url = self.build_url(request, credential, Utc::now().timestamp());
        let builder = self.http.request(request.method.as_reqwest(), url);
        let builder = match (&request.body, form) {
            (_, Some(form)) => builder.multipart(form),
            (Some(RequestBody::Json(body)), None) => builder.json(body),
            _ => builder,
        };

        let started = Instant::now();
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            sent = builder.send() => sent,
        };
        let http_response = sent?;

        let status = http_response.status().as_u16();
        let headers = parse_response_headers(http_response.headers());
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            read = http_response.text() => read,
        };
        let text = read?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            attempt,
            status,
            latency_ms = started.elapsed().as_millis(),
            response = %truncate(&text, LOG_BODY_LIMIT),
            "marketplace request completed"
        );

        let response = Response::new(status, headers, Response::parse_body(&text));
        response.classify().map_err(|error| {
            log_api_error(&request.path, &error);
            error
        })?;
        Ok(response)
    }

    async fn refresh_proactively(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if !self.credentials.has_refresher() {
            return Ok(());
        }
        match self
            .credentials
            .refresh_if_expiring(cancel, self.refresh_buffer)
            .await
        {
            Ok(_) => Ok(()),
            Err(CredentialError::Cancelled) => Err(ClientError::Cancelled),
            Err(error) => {
                tracing::warn!(error = %error, "proactive token refresh failed, using current token");
                Ok(())
            }
        }
    }
}

/// Builds the HTTP client shared by every call made with `config`.
pub(crate) fn build_http_client(config: &MarketplaceConfig) -> Result<reqwest::Client, ConfigError> {
    let user_agent_prefix = config
        .user_agent_prefix()
        .map_or(String::new(), |prefix| format!("{prefix} | "));
    let rust_version = env!("CARGO_PKG_RUST_VERSION");
    let user_agent =
        format!("{user_agent_prefix}Marketplace API Library v{SDK_VERSION} | Rust {rust_version}");

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.request_timeout())
        .user_agent(user_agent)
        .default_headers(headers)
        .build()
        .map_err(|error| ConfigError::HttpClient {
            reason: error.to_string(),
        })
}

/// Joins a base URL, path and already-sorted query parameters.
pub(crate) fn signed_url<K: AsRef<str>>(
    base_url: &str,
    path: &str,
    params: &BTreeMap<K, String>,
) -> String {
    let query = params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key.as_ref()),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base_url}{path}?{query}")
}

fn parse_response_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, Vec<String>> {
    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        let key = name.as_str().to_lowercase();
        let value = value.to_str().unwrap_or_default().to_string();
        result.entry(key).or_default().push(value);
    }
    result
}

fn log_api_error(path: &str, error: &ApiError) {
    tracing::warn!(
        path,
        error_code = %error.code,
        message = %error.message,
        http_status = error.http_status,
        request_id = error.request_id.as_deref().unwrap_or_default(),
        "marketplace API error"
    );
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
