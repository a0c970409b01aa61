//! Platform-agnostic client abstraction.
//!
//! Business workflows talk to a [`MarketplaceClient`] rather than to a
//! concrete [`ApiClient`], and resolve the client for a connection through a
//! [`MarketplaceRegistry`] keyed by platform name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::auth::CredentialState;
use crate::clients::errors::ClientError;
use crate::clients::http_client::ApiClient;
use crate::clients::http_request::Request;
use crate::clients::http_response::Response;

/// A client for one marketplace platform.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Returns the platform name, e.g. `shopee`.
    fn platform(&self) -> &str;

    /// Executes a request with signing, rate limiting, retries and refresh.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, ClientError>;

    /// Returns the credential state used by this client.
    fn credentials(&self) -> &CredentialState;
}

#[async_trait]
impl MarketplaceClient for ApiClient {
    fn platform(&self) -> &str {
        Self::platform(self)
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, ClientError> {
        Self::execute(self, cancel, request).await
    }

    fn credentials(&self) -> &CredentialState {
        Self::credentials(self)
    }
}

/// Maps platform names to clients.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use marketplace_api::clients::MarketplaceRegistry;
///
/// let mut registry = MarketplaceRegistry::new();
/// registry.register(Arc::new(shopee_client));
///
/// let client = registry.get("shopee")?;
/// let response = client.execute(&cancel, &request).await?;
/// ```
#[derive(Default, Clone)]
pub struct MarketplaceRegistry {
    clients: HashMap<String, Arc<dyn MarketplaceClient>>,
}

impl MarketplaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` under its platform name, replacing any previous
    /// client for that platform.
    pub fn register(&mut self, client: Arc<dyn MarketplaceClient>) -> &mut Self {
        self.clients.insert(client.platform().to_string(), client);
        self
    }

    /// Returns the client for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnsupportedPlatform`] if none is registered.
    pub fn get(&self, platform: &str) -> Result<Arc<dyn MarketplaceClient>, ClientError> {
        self.clients
            .get(platform)
            .cloned()
            .ok_or_else(|| ClientError::UnsupportedPlatform {
                platform: platform.to_string(),
            })
    }

    /// Returns `true` if a client is registered for `platform`.
    #[must_use]
    pub fn contains(&self, platform: &str) -> bool {
        self.clients.contains_key(platform)
    }

    /// Returns the registered platform names, sorted.
    #[must_use]
    pub fn platforms(&self) -> Vec<&str> {
        let mut platforms: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        platforms.sort_unstable();
        platforms
    }
}

impl fmt::Debug for MarketplaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory client that answers every request with its path.
    pub(crate) struct StaticClient {
        pub(crate) platform: &'static str,
        pub(crate) calls: AtomicU32,
        credentials: CredentialState,
    }

    impl StaticClient {
        pub(crate) fn new(platform: &'static str) -> Self {
            Self {
                platform,
                calls: AtomicU32::new(0),
                credentials: CredentialState::default(),
            }
        }
    }

    #[async_trait]
    impl MarketplaceClient for StaticClient {
        fn platform(&self) -> &str {
            self.platform
        }

        async fn execute(
            &self,
            cancel: &CancellationToken,
            request: &Request,
        ) -> Result<Response, ClientError> {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(
                200,
                HashMap::new(),
                json!({ "response": { "path": request.path } }),
            ))
        }

        fn credentials(&self) -> &CredentialState {
            &self.credentials
        }
    }

    #[test]
    fn test_unknown_platform() {
        let registry = MarketplaceRegistry::new();
        match registry.get("lazada") {
            Err(ClientError::UnsupportedPlatform { platform }) => assert_eq!(platform, "lazada"),
            other => panic!("unexpected {:?}", other.map(|c| c.platform().to_string())),
        }
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = MarketplaceRegistry::new();
        registry
            .register(Arc::new(StaticClient::new("tiktok")))
            .register(Arc::new(StaticClient::new("shopee")));

        assert_eq!(registry.platforms(), vec!["shopee", "tiktok"]);
        assert!(registry.contains("shopee"));
        assert_eq!(registry.get("tiktok").unwrap().platform(), "tiktok");
        assert!(format!("{registry:?}").contains("shopee"));
    }

    #[tokio::test]
    async fn test_registered_client_executes() {
        let mut registry = MarketplaceRegistry::new();
        registry.register(Arc::new(StaticClient::new("shopee")));

        let request = Request::builder(crate::clients::HttpMethod::Get, "/api/v2/shop/get_shop_info")
            .build()
            .unwrap();
        let response = registry
            .get("shopee")
            .unwrap()
            .execute(&CancellationToken::new(), &request)
            .await
            .unwrap();
        assert_eq!(response.response_field().unwrap()["path"], "/api/v2/shop/get_shop_info");
    }
}
