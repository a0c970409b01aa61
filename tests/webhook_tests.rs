//! Integration tests for inbound webhook handling.
//!
//! These tests sign bodies the way the marketplace does and run them through
//! the public verification and decoding API.

use marketplace_api::auth::Signer;
use marketplace_api::webhooks::{
    timestamp_within_window, PushCode, WebhookError, WebhookPayload, WebhookRequest,
    WebhookVerifier, MAX_TIMESTAMP_DRIFT,
};
use marketplace_api::{BaseUrl, MarketplaceConfig, PartnerId, PartnerKey};
use proptest::prelude::*;

const CALLBACK_URL: &str = "https://hooks.example.com/marketplace/push";
const PARTNER_KEY: &str = "webhook-partner-key";

fn config() -> MarketplaceConfig {
    MarketplaceConfig::builder()
        .partner_id(PartnerId::new(2_001_234).unwrap())
        .partner_key(PartnerKey::new(PARTNER_KEY).unwrap())
        .webhook_url(BaseUrl::new(CALLBACK_URL).unwrap())
        .build()
        .unwrap()
}

/// Signs `body` the way the marketplace does.
fn sign(body: &[u8]) -> String {
    let mut message = format!("{CALLBACK_URL}|").into_bytes();
    message.extend_from_slice(body);
    Signer::new(&PartnerKey::new(PARTNER_KEY).unwrap()).sign(&message)
}

fn signed_request(body: &[u8]) -> WebhookRequest {
    let signature = sign(body);
    WebhookRequest::from_headers(
        body.to_vec(),
        [
            ("content-type", "application/json"),
            ("authorization", signature.as_str()),
        ],
    )
}

#[test]
fn test_order_status_push_end_to_end() {
    let verifier = WebhookVerifier::from_config(&config()).unwrap();
    let body = br#"{"code":3,"shop_id":55001,"timestamp":1700000000,"data":{"ordersn":"2401019XYZ","status":"READY_TO_SHIP","update_time":1699999990,"shop_id":55001}}"#;

    let event = verifier.verify_and_parse(&signed_request(body)).unwrap();

    assert_eq!(event.code, PushCode::OrderStatusUpdate);
    assert_eq!(event.event_type, "order.status_changed");
    assert_eq!(event.shop_id, 55001);
    assert_eq!(event.order_sn(), Some("2401019XYZ"));
    match event.payload {
        WebhookPayload::OrderStatus(data) => {
            assert_eq!(data.status, "READY_TO_SHIP");
            assert_eq!(data.update_time, 1_699_999_990);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_unknown_push_code_is_tagged() {
    let verifier = WebhookVerifier::from_config(&config()).unwrap();
    let body = br#"{"code":99,"shop_id":1,"timestamp":1700000000,"data":{"anything":[1,2,3]}}"#;

    let event = verifier.verify_and_parse(&signed_request(body)).unwrap();

    assert_eq!(event.event_type, "unknown.99");
    assert!(event.code.is_unknown());
    assert!(matches!(event.payload, WebhookPayload::Generic(ref map) if map.contains_key("anything")));
}

#[test]
fn test_missing_and_wrong_signatures() {
    let verifier = WebhookVerifier::from_config(&config()).unwrap();
    let body = br#"{"code":10,"shop_id":1,"timestamp":1700000000,"data":{}}"#;

    let unsigned = WebhookRequest::from_headers(body.to_vec(), [("content-type", "application/json")]);
    assert!(matches!(
        verifier.verify_request(&unsigned),
        Err(WebhookError::MissingSignature)
    ));

    let forged = WebhookRequest::new(body.to_vec(), Some("0".repeat(64)));
    assert!(matches!(
        verifier.verify_request(&forged),
        Err(WebhookError::InvalidSignature)
    ));
}

#[test]
fn test_replay_window() {
    let now = chrono::Utc::now().timestamp();
    let window = i64::try_from(MAX_TIMESTAMP_DRIFT.as_secs()).unwrap();
    assert!(timestamp_within_window(now - window, now));
    assert!(!timestamp_within_window(now - window - 1, now));
}

proptest! {
    #[test]
    fn prop_any_body_verifies_with_its_own_signature(body in proptest::collection::vec(any::<u8>(), 0..512)) {
        let verifier = WebhookVerifier::from_config(&config()).unwrap();
        prop_assert!(verifier.verify(&body, &sign(&body)));
    }

    #[test]
    fn prop_flipping_any_byte_breaks_the_signature(
        body in proptest::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let verifier = WebhookVerifier::from_config(&config()).unwrap();
        let signature = sign(&body);
        let mut tampered = body.clone();
        let position = index.index(tampered.len());
        tampered[position] ^= mask;
        prop_assert!(!verifier.verify(&tampered, &signature));
    }
}
