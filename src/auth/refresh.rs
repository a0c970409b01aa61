//! Token refresh against the Open Platform auth endpoint.
//!
//! [`OpenPlatformRefresher`] implements [`Refresher`] by calling
//! `POST /api/v2/auth/access_token/get` with a public (partner-level)
//! signature:
//!
//! ```json
//! { "refresh_token": "…", "partner_id": 2001234, "shop_id": 55001 }
//! ```
//!
//! The platform answers with a new token pair and its lifetime in seconds:
//!
//! ```json
//! { "access_token": "…", "refresh_token": "…", "expire_in": 14400, "error": "", "message": "" }
//! ```
//!
//! The call is made directly rather than through an
//! [`ApiClient`](crate::clients::ApiClient), so a failing refresh can never
//! recurse into another refresh.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::credential::{BoxError, RefreshedTokens, Refresher};
use crate::auth::Signer;
use crate::clients::http_client::{build_http_client, signed_url};
use crate::clients::Response;
use crate::config::{BaseUrl, MarketplaceConfig, PartnerId};
use crate::error::ConfigError;

/// Path of the token refresh endpoint.
pub const REFRESH_TOKEN_PATH: &str = "/api/v2/auth/access_token/get";

#[derive(Debug, Serialize)]
struct TokenRefreshRequest<'a> {
    refresh_token: &'a str,
    partner_id: i64,
    shop_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccessTokenResponse {
    access_token: String,
    refresh_token: String,
    expire_in: i64,
}

/// [`Refresher`] backed by the platform's token endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use marketplace_api::ApiClient;
/// use marketplace_api::auth::OpenPlatformRefresher;
///
/// let refresher = OpenPlatformRefresher::new(&config)?;
/// let client = ApiClient::new(config)?.with_refresher(Arc::new(refresher));
/// ```
#[derive(Debug, Clone)]
pub struct OpenPlatformRefresher {
    http: reqwest::Client,
    base_url: BaseUrl,
    partner_id: PartnerId,
    signer: Signer,
}

impl OpenPlatformRefresher {
    /// Creates a refresher for the partner and environment in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &MarketplaceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.base_url().clone(),
            partner_id: config.partner_id(),
            signer: Signer::new(config.partner_key()),
        })
    }

    fn url(&self, timestamp: i64) -> String {
        let partner_id = self.partner_id.get();
        let sign = self
            .signer
            .generate_public(partner_id, REFRESH_TOKEN_PATH, timestamp);

        let mut params = BTreeMap::new();
        params.insert("partner_id", partner_id.to_string());
        params.insert("sign", sign);
        params.insert("timestamp", timestamp.to_string());
        signed_url(self.base_url.as_ref(), REFRESH_TOKEN_PATH, &params)
    }
}

#[async_trait]
impl Refresher for OpenPlatformRefresher {
    async fn refresh_token(
        &self,
        refresh_token: &str,
        shop_id: i64,
    ) -> Result<RefreshedTokens, BoxError> {
        let body = TokenRefreshRequest {
            refresh_token,
            partner_id: self.partner_id.get(),
            shop_id,
        };

        let http_response = self
            .http
            .post(self.url(Utc::now().timestamp()))
            .json(&body)
            .send()
            .await?;
        let status = http_response.status().as_u16();
        let text = http_response.text().await?;

        let response = Response::new(status, HashMap::new(), Response::parse_body(&text));
        response.classify()?;

        let tokens: AccessTokenResponse = response.json()?;
        if tokens.access_token.is_empty() {
            return Err("token endpoint returned no access token".into());
        }

        Ok(RefreshedTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: Duration::from_secs(u64::try_from(tokens.expire_in).unwrap_or(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ApiError;
    use crate::config::PartnerKey;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> MarketplaceConfig {
        MarketplaceConfig::builder()
            .partner_id(PartnerId::new(2_001_234).unwrap())
            .partner_key(PartnerKey::new("partner-key").unwrap())
            .base_url(BaseUrl::new(base_url).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_url_uses_public_signature() {
        let refresher = OpenPlatformRefresher::new(&config("https://partner.example.com")).unwrap();
        let url = refresher.url(1_700_000_000);
        let expected_sign = Signer::new(&PartnerKey::new("partner-key").unwrap()).generate_public(
            2_001_234,
            REFRESH_TOKEN_PATH,
            1_700_000_000,
        );
        assert_eq!(
            url,
            format!(
                "https://partner.example.com/api/v2/auth/access_token/get?partner_id=2001234&sign={expected_sign}&timestamp=1700000000"
            )
        );
    }

    #[tokio::test]
    async fn test_refresh_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_TOKEN_PATH))
            .and(query_param("partner_id", "2001234"))
            .and(body_json(serde_json::json!({
                "refresh_token": "old-refresh",
                "partner_id": 2_001_234,
                "shop_id": 55
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expire_in": 14400,
                "error": "",
                "message": "",
                "request_id": "abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refresher = OpenPlatformRefresher::new(&config(&server.uri())).unwrap();
        let tokens = refresher.refresh_token("old-refresh", 55).await.unwrap();

        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token, "new-refresh");
        assert_eq!(tokens.expires_in, Duration::from_secs(14400));
    }

    #[tokio::test]
    async fn test_refresh_token_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "error_param",
                "message": "invalid refresh_token",
                "request_id": "req-1"
            })))
            .mount(&server)
            .await;

        let refresher = OpenPlatformRefresher::new(&config(&server.uri())).unwrap();
        let error = refresher.refresh_token("dead", 55).await.unwrap_err();
        let api_error = error.downcast_ref::<ApiError>().unwrap();
        assert!(api_error.is_refresh_token_expired());
        assert_eq!(api_error.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_refresh_token_rejects_empty_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "",
                "expire_in": 14400
            })))
            .mount(&server)
            .await;

        let refresher = OpenPlatformRefresher::new(&config(&server.uri())).unwrap();
        assert!(refresher.refresh_token("r", 1).await.is_err());
    }
}
