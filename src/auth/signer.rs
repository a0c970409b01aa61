//! HMAC-SHA256 request signing and webhook signature verification.
//!
//! Every outbound Open Platform call carries a `sign` query parameter computed
//! over a canonical base string, and every inbound webhook carries a signature
//! over the callback URL and raw body. Both use HMAC-SHA256 keyed by the
//! partner key and are hex-encoded (lowercase).
//!
//! # Base strings
//!
//! | Call type     | Base string                                                 |
//! |---------------|-------------------------------------------------------------|
//! | Public        | `partner_id + path + timestamp`                             |
//! | Authenticated | `partner_id + path + timestamp + access_token + shop_id`    |
//! | Merchant      | `partner_id + path + timestamp + access_token + merchant_id`|
//! | Webhook       | `callback_url + "|" + raw_body`                             |
//!
//! # Security
//!
//! Webhook signatures are compared in constant time to prevent timing attacks.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::auth::Signer;
//! use marketplace_api::PartnerKey;
//!
//! let signer = Signer::new(&PartnerKey::new("partner-key").unwrap());
//! let sign = signer.generate_public(2_001_234, "/api/v2/shop/get_shop_info", 1_700_000_000);
//! assert_eq!(sign.len(), 64);
//!
//! let body = br#"{"code":3}"#;
//! let signature = signer.sign(b"https://app.example.com/webhook|{\"code\":3}");
//! assert!(signer.verify_webhook("https://app.example.com/webhook", body, &signature));
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::PartnerKey;

type HmacSha256 = Hmac<Sha256>;

/// Computes HMAC-SHA256 signatures with the partner key.
///
/// The signer is cheap to clone and holds no state beyond the key; every
/// method is a pure function of its inputs.
#[derive(Clone)]
pub struct Signer {
    partner_key: PartnerKey,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("partner_key", &self.partner_key)
            .finish()
    }
}

impl Signer {
    /// Creates a signer keyed by the given partner key.
    #[must_use]
    pub fn new(partner_key: &PartnerKey) -> Self {
        Self {
            partner_key: partner_key.clone(),
        }
    }

    /// Signs a call to a public (unauthenticated) endpoint.
    #[must_use]
    pub fn generate_public(&self, partner_id: i64, path: &str, timestamp: i64) -> String {
        self.sign(format!("{partner_id}{path}{timestamp}").as_bytes())
    }

    /// Signs a call to a shop-level authenticated endpoint.
    #[must_use]
    pub fn generate_authenticated(
        &self,
        partner_id: i64,
        path: &str,
        timestamp: i64,
        access_token: &str,
        shop_id: i64,
    ) -> String {
        self.sign(format!("{partner_id}{path}{timestamp}{access_token}{shop_id}").as_bytes())
    }

    /// Signs a call to a merchant-level authenticated endpoint.
    #[must_use]
    pub fn generate_merchant(
        &self,
        partner_id: i64,
        path: &str,
        timestamp: i64,
        access_token: &str,
        merchant_id: i64,
    ) -> String {
        self.sign(format!("{partner_id}{path}{timestamp}{access_token}{merchant_id}").as_bytes())
    }

    /// Verifies the signature of an inbound webhook.
    ///
    /// Recomputes HMAC-SHA256 over `base_url + "|" + body` and compares it to
    /// `provided_signature` in constant time. The body is taken as raw bytes so
    /// that the exact payload is signed without UTF-8 interpretation.
    #[must_use]
    pub fn verify_webhook(&self, base_url: &str, body: &[u8], provided_signature: &str) -> bool {
        let mut message = Vec::with_capacity(base_url.len() + 1 + body.len());
        message.extend_from_slice(base_url.as_bytes());
        message.push(b'|');
        message.extend_from_slice(body);

        let expected = self.sign(&message);
        constant_time_compare(&expected, provided_signature)
    }

    /// Computes the lowercase hex HMAC-SHA256 of `message`.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
    pub fn sign(&self, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.partner_key.as_ref().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Performs constant-time comparison of two strings.
///
/// Strings of different lengths compare unequal without leaking where they
/// first differ.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
