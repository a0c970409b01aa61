//! Webhook signature verification.
//!
//! The marketplace signs every push with HMAC-SHA256 over
//! `callback_url + "|" + raw_body`, keyed with the partner key, and sends the
//! lowercase hex digest in the `Authorization` header.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::auth::Signer;
//! use marketplace_api::webhooks::{WebhookRequest, WebhookVerifier};
//! use marketplace_api::{BaseUrl, MarketplaceConfig, PartnerId, PartnerKey};
//!
//! let config = MarketplaceConfig::builder()
//!     .partner_id(PartnerId::new(2_001_234).unwrap())
//!     .partner_key(PartnerKey::new("partner-key").unwrap())
//!     .webhook_url(BaseUrl::new("https://shop.example.com/webhooks/marketplace").unwrap())
//!     .build()
//!     .unwrap();
//! let verifier = WebhookVerifier::from_config(&config).unwrap();
//!
//! let body = br#"{"code":10,"shop_id":1,"timestamp":1700000000,"data":{}}"#;
//! let mut message = b"https://shop.example.com/webhooks/marketplace|".to_vec();
//! message.extend_from_slice(body);
//! let signature = Signer::new(config.partner_key()).sign(&message);
//!
//! let request = WebhookRequest::from_headers(body.to_vec(), [("authorization", signature.as_str())]);
//! let event = verifier.verify_and_parse(&request).unwrap();
//! assert_eq!(event.event_type, "webhook.test");
//! ```
//!
//! # Security
//!
//! Signatures are compared in constant time. Replay protection is left to
//! the caller; [`timestamp_within_window`] is provided for that check.

use std::time::Duration;

use crate::auth::Signer;
use crate::config::{BaseUrl, MarketplaceConfig, PartnerKey};
use crate::webhooks::{WebhookError, WebhookEvent};

/// HTTP header carrying the push signature.
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// Largest accepted distance between a push timestamp and server time.
pub const MAX_TIMESTAMP_DRIFT: Duration = Duration::from_secs(300);

/// An inbound push as received by the caller's HTTP handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookRequest {
    body: Vec<u8>,
    signature: Option<String>,
}

impl WebhookRequest {
    /// Creates a request from the raw body and `Authorization` value.
    #[must_use]
    pub fn new(body: Vec<u8>, signature: Option<String>) -> Self {
        Self {
            body,
            signature: signature.filter(|s| !s.is_empty()),
        }
    }

    /// Creates a request from the raw body and the request headers.
    ///
    /// The `Authorization` header is looked up case-insensitively.
    #[must_use]
    pub fn from_headers<I, K, V>(body: Vec<u8>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let signature = headers
            .into_iter()
            .find(|(name, _)| name.as_ref().eq_ignore_ascii_case(HEADER_AUTHORIZATION))
            .map(|(_, value)| value.as_ref().trim().to_string());
        Self::new(body, signature)
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the signature, if one was sent.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

/// Verifies and decodes pushes for one callback URL.
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    signer: Signer,
    callback_url: BaseUrl,
}

impl WebhookVerifier {
    /// Creates a verifier for pushes delivered to `callback_url`.
    #[must_use]
    pub fn new(partner_key: &PartnerKey, callback_url: BaseUrl) -> Self {
        Self {
            signer: Signer::new(partner_key),
            callback_url,
        }
    }

    /// Creates a verifier from the partner key and `webhook_url` of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MissingCallbackUrl`] if no `webhook_url` is set.
    pub fn from_config(config: &MarketplaceConfig) -> Result<Self, WebhookError> {
        let callback_url = config
            .webhook_url()
            .ok_or(WebhookError::MissingCallbackUrl)?
            .clone();
        Ok(Self::new(config.partner_key(), callback_url))
    }

    /// Returns the callback URL signatures are computed against.
    #[must_use]
    pub const fn callback_url(&self) -> &BaseUrl {
        &self.callback_url
    }

    /// Returns `true` if `signature` matches `body`.
    #[must_use]
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        self.signer
            .verify_webhook(self.callback_url.as_ref(), body, signature)
    }

    /// Verifies the signature carried by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MissingSignature`] if the request has no
    /// signature and [`WebhookError::InvalidSignature`] if it does not match.
    pub fn verify_request(&self, request: &WebhookRequest) -> Result<(), WebhookError> {
        let Some(signature) = request.signature() else {
            tracing::warn!("webhook missing authorization header");
            return Err(WebhookError::MissingSignature);
        };

        if self.verify(request.body(), signature) {
            Ok(())
        } else {
            tracing::warn!(body_len = request.body().len(), "webhook signature verification failed");
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Decodes a push body without checking its signature.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedPayload`] if the body cannot be decoded.
    pub fn parse(&self, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
        let event = WebhookEvent::from_slice(body)?;
        tracing::debug!(
            event_type = %event.event_type,
            shop_id = event.shop_id,
            code = event.code.code(),
            "parsed webhook event"
        );
        Ok(event)
    }

    /// Verifies `request` and then decodes its body.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Self::verify_request`] or [`Self::parse`].
    pub fn verify_and_parse(&self, request: &WebhookRequest) -> Result<WebhookEvent, WebhookError> {
        self.verify_request(request)?;
        self.parse(request.body())
    }
}

/// Returns `true` if `timestamp` lies within [`MAX_TIMESTAMP_DRIFT`] of
/// `server_timestamp`, in either direction. Both are Unix seconds.
#[must_use]
pub const fn timestamp_within_window(timestamp: i64, server_timestamp: i64) -> bool {
    timestamp.abs_diff(server_timestamp) <= MAX_TIMESTAMP_DRIFT.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartnerId;

    const CALLBACK: &str = "https://shop.example.com/webhooks/marketplace";
    const BODY: &[u8] = br#"{"code":3,"shop_id":55,"timestamp":1700000000,"data":{"ordersn":"SN9","status":"SHIPPED","update_time":1700000000,"shop_id":55}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            &PartnerKey::new("partner-key").unwrap(),
            BaseUrl::new(CALLBACK).unwrap(),
        )
    }

    fn signature_for(body: &[u8]) -> String {
        let mut message = format!("{CALLBACK}|").into_bytes();
        message.extend_from_slice(body);
        Signer::new(&PartnerKey::new("partner-key").unwrap()).sign(&message)
    }

    #[test]
    fn test_header_constant() {
        assert_eq!(HEADER_AUTHORIZATION, "Authorization");
    }

    #[test]
    fn test_from_headers_is_case_insensitive() {
        let request = WebhookRequest::from_headers(
            b"body".to_vec(),
            [("Content-Type", "application/json"), ("AUTHORIZATION", " abc123 ")],
        );
        assert_eq!(request.body(), b"body");
        assert_eq!(request.signature(), Some("abc123"));

        let request = WebhookRequest::from_headers(b"body".to_vec(), Vec::<(String, String)>::new());
        assert_eq!(request.signature(), None);
    }

    #[test]
    fn test_empty_signature_counts_as_missing() {
        let request = WebhookRequest::new(BODY.to_vec(), Some(String::new()));
        assert!(matches!(
            verifier().verify_request(&request),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn test_verify_accepts_valid_signature() {
        let verifier = verifier();
        assert!(verifier.verify(BODY, &signature_for(BODY)));

        let request = WebhookRequest::new(BODY.to_vec(), Some(signature_for(BODY)));
        assert!(verifier.verify_request(&request).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let verifier = verifier();
        let signature = signature_for(BODY);

        for index in [0, BODY.len() / 2, BODY.len() - 1] {
            let mut tampered = BODY.to_vec();
            tampered[index] ^= 0x01;
            assert!(!verifier.verify(&tampered, &signature), "byte {index}");
        }

        let request = WebhookRequest::new(b"{}".to_vec(), Some(signature));
        assert!(matches!(
            verifier.verify_request(&request),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_is_bound_to_callback_url() {
        let other = WebhookVerifier::new(
            &PartnerKey::new("partner-key").unwrap(),
            BaseUrl::new("https://other.example.com/hook").unwrap(),
        );
        assert!(!other.verify(BODY, &signature_for(BODY)));
    }

    #[test]
    fn test_verify_and_parse() {
        let request = WebhookRequest::new(BODY.to_vec(), Some(signature_for(BODY)));
        let event = verifier().verify_and_parse(&request).unwrap();
        assert_eq!(event.event_type, "order.status_changed");
        assert_eq!(event.shop_id, 55);
        assert_eq!(event.order_sn(), Some("SN9"));

        let unsigned = WebhookRequest::new(BODY.to_vec(), None);
        assert!(verifier().verify_and_parse(&unsigned).is_err());
    }

    #[test]
    fn test_parse_does_not_check_signature() {
        let event = verifier().parse(BODY).unwrap();
        assert_eq!(event.timestamp, 1_700_000_000);
        assert!(matches!(
            verifier().parse(b"[]"),
            Err(WebhookError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_from_config() {
        let builder = || {
            MarketplaceConfig::builder()
                .partner_id(PartnerId::new(1).unwrap())
                .partner_key(PartnerKey::new("partner-key").unwrap())
        };

        let missing = builder().build().unwrap();
        assert!(matches!(
            WebhookVerifier::from_config(&missing),
            Err(WebhookError::MissingCallbackUrl)
        ));

        let config = builder()
            .webhook_url(BaseUrl::new(CALLBACK).unwrap())
            .build()
            .unwrap();
        let verifier = WebhookVerifier::from_config(&config).unwrap();
        assert_eq!(verifier.callback_url().as_ref(), CALLBACK);
        assert!(verifier.verify(BODY, &signature_for(BODY)));
    }

    #[test]
    fn test_timestamp_window() {
        let now = 1_700_000_000;
        assert!(timestamp_within_window(now, now));
        assert!(timestamp_within_window(now - 300, now));
        assert!(timestamp_within_window(now + 300, now));
        assert!(!timestamp_within_window(now - 301, now));
        assert!(!timestamp_within_window(now + 301, now));
        assert!(!timestamp_within_window(i64::MIN, i64::MAX));
    }
}
