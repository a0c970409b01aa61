//! Push event types.
//!
//! The marketplace delivers every push notification in the same envelope:
//!
//! ```json
//! { "code": 3, "shop_id": 55001, "timestamp": 1700000000, "data": { … } }
//! ```
//!
//! `code` selects the event kind. Codes with a known shape decode `data` into
//! a typed [`WebhookPayload`]; every other code keeps `data` as a generic JSON
//! object and is reported as `unknown.<code>` when the code is unrecognised.
//!
//! # Example
//!
//! ```rust
//! use marketplace_api::webhooks::{PushCode, WebhookEvent, WebhookPayload};
//!
//! let body = br#"{"code":3,"shop_id":55001,"timestamp":1700000000,
//!     "data":{"ordersn":"240101ABC","status":"READY_TO_SHIP","update_time":1700000000,"shop_id":55001}}"#;
//!
//! let event = WebhookEvent::from_slice(body).unwrap();
//! assert_eq!(event.code, PushCode::OrderStatusUpdate);
//! assert_eq!(event.event_type, "order.status_changed");
//! assert_eq!(event.order_sn(), Some("240101ABC"));
//! assert!(matches!(event.payload, WebhookPayload::OrderStatus(_)));
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::WebhookError;

/// Push notification codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PushCode {
    /// A shop authorised or de-authorised the partner app (code 1).
    ShopAuthorization,
    /// An order changed status (code 3).
    OrderStatusUpdate,
    /// A shipment tracking number was assigned or updated (code 4).
    TrackingUpdate,
    /// An item entered or left a promotion (code 5).
    ItemPromotion,
    /// Reserved stock changed (code 6).
    ReservedStockChange,
    /// A brand registration was reviewed (code 7).
    BrandRegister,
    /// Open API notice (code 8).
    OpenApi,
    /// Test push sent from the partner console (code 10).
    WebhookTest,
    /// Any other code.
    Unknown(i32),
}

impl PushCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ShopAuthorization => 1,
            Self::OrderStatusUpdate => 3,
            Self::TrackingUpdate => 4,
            Self::ItemPromotion => 5,
            Self::ReservedStockChange => 6,
            Self::BrandRegister => 7,
            Self::OpenApi => 8,
            Self::WebhookTest => 10,
            Self::Unknown(code) => code,
        }
    }

    /// Returns the event type name, e.g. `order.status_changed`.
    #[must_use]
    pub fn event_type(self) -> String {
        let name = match self {
            Self::ShopAuthorization => "shop.authorization",
            Self::OrderStatusUpdate => "order.status_changed",
            Self::TrackingUpdate => "order.tracking_update",
            Self::ItemPromotion => "item.promotion",
            Self::ReservedStockChange => "inventory.reserved_changed",
            Self::BrandRegister => "brand.register",
            Self::OpenApi => "openapi",
            Self::WebhookTest => "webhook.test",
            Self::Unknown(code) => return format!("unknown.{code}"),
        };
        name.to_string()
    }

    /// Returns `true` for codes outside the known set.
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl From<i32> for PushCode {
    fn from(code: i32) -> Self {
        match code {
            1 => Self::ShopAuthorization,
            3 => Self::OrderStatusUpdate,
            4 => Self::TrackingUpdate,
            5 => Self::ItemPromotion,
            6 => Self::ReservedStockChange,
            7 => Self::BrandRegister,
            8 => Self::OpenApi,
            10 => Self::WebhookTest,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for PushCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.event_type())
    }
}

/// Data of a shop authorisation push.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopAuthorizationData {
    /// Authorisation result code.
    pub code: i32,
    /// The shop concerned.
    pub shop_id: i64,
    /// Free-text message.
    #[serde(rename = "msg")]
    pub message: String,
}

/// Data of an order status push.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderStatusData {
    /// Order serial number.
    #[serde(rename = "ordersn")]
    pub order_sn: String,
    /// New order status, e.g. `READY_TO_SHIP`.
    pub status: String,
    /// Unix seconds of the change.
    pub update_time: i64,
    /// The shop that owns the order.
    pub shop_id: i64,
}

/// Data of a tracking update push.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingUpdateData {
    /// Order serial number.
    #[serde(rename = "ordersn")]
    pub order_sn: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// The shop that owns the order.
    pub shop_id: i64,
    /// Logistics status, e.g. `LOGISTICS_PICKUP_DONE`.
    pub logistics_status: String,
    /// Unix seconds of the change.
    pub update_time: i64,
}

/// Decoded `data` of a push.
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookPayload {
    /// Code 1.
    ShopAuthorization(ShopAuthorizationData),
    /// Code 3.
    OrderStatus(OrderStatusData),
    /// Code 4.
    TrackingUpdate(TrackingUpdateData),
    /// Every other code undecoded, or any push without `data`.
    Generic(Map<String, Value>),
}

impl WebhookPayload {
    fn decode(code: PushCode, data: Value) -> Result<Self, WebhookError> {
        if data.is_null() {
            return Ok(Self::Generic(Map::new()));
        }
        let payload = match code {
            PushCode::ShopAuthorization => Self::ShopAuthorization(serde_json::from_value(data)?),
            PushCode::OrderStatusUpdate => Self::OrderStatus(serde_json::from_value(data)?),
            PushCode::TrackingUpdate => Self::TrackingUpdate(serde_json::from_value(data)?),
            _ => match data {
                Value::Object(map) => Self::Generic(map),
                other => {
                    return Err(WebhookError::MalformedPayload {
                        reason: format!("data must be an object, got {other}"),
                    })
                }
            },
        };
        Ok(payload)
    }
}

#[derive(Deserialize)]
struct PushEnvelope {
    code: i32,
    #[serde(default)]
    shop_id: i64,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    data: Value,
}

/// A decoded push notification.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookEvent {
    /// Event type name, e.g. `order.status_changed` or `unknown.42`.
    pub event_type: String,
    /// The push code.
    pub code: PushCode,
    /// The shop the push was sent for.
    pub shop_id: i64,
    /// Unix seconds at which the marketplace sent the push.
    pub timestamp: i64,
    /// The decoded data.
    pub payload: WebhookPayload,
}

impl WebhookEvent {
    /// Decodes a raw push body.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedPayload`] if the body is not a push
    /// envelope, or if `data` does not match the shape its code requires.
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        let envelope: PushEnvelope = serde_json::from_slice(body)?;
        let code = PushCode::from(envelope.code);
        Ok(Self {
            event_type: code.event_type(),
            code,
            shop_id: envelope.shop_id,
            timestamp: envelope.timestamp,
            payload: WebhookPayload::decode(code, envelope.data)?,
        })
    }

    /// Returns the push time, if `timestamp` is representable.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Returns the order serial number for order-related pushes.
    #[must_use]
    pub fn order_sn(&self) -> Option<&str> {
        match &self.payload {
            WebhookPayload::OrderStatus(data) => Some(&data.order_sn),
            WebhookPayload::TrackingUpdate(data) => Some(&data.order_sn),
            WebhookPayload::Generic(map) => map.get("ordersn").and_then(Value::as_str),
            WebhookPayload::ShopAuthorization(_) => None,
        }
    }

    /// Returns the shop ID carried inside `data`.
    ///
    /// This can differ from [`WebhookEvent::shop_id`] for partner-level pushes.
    #[must_use]
    pub fn payload_shop_id(&self) -> Option<i64> {
        match &self.payload {
            WebhookPayload::ShopAuthorization(data) => Some(data.shop_id),
            WebhookPayload::OrderStatus(data) => Some(data.shop_id),
            WebhookPayload::TrackingUpdate(data) => Some(data.shop_id),
            WebhookPayload::Generic(map) => map.get("shop_id").and_then(Value::as_i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_code_mapping() {
        let known = [
            (1, "shop.authorization"),
            (3, "order.status_changed"),
            (4, "order.tracking_update"),
            (5, "item.promotion"),
            (6, "inventory.reserved_changed"),
            (7, "brand.register"),
            (8, "openapi"),
            (10, "webhook.test"),
        ];
        for (code, name) in known {
            let push_code = PushCode::from(code);
            assert!(!push_code.is_unknown(), "code {code}");
            assert_eq!(push_code.code(), code);
            assert_eq!(push_code.event_type(), name);
        }

        assert_eq!(PushCode::from(2), PushCode::Unknown(2));
        assert_eq!(PushCode::from(42).event_type(), "unknown.42");
        assert_eq!(PushCode::Unknown(42).to_string(), "unknown.42");
    }

    #[test]
    fn test_shop_authorization_payload() {
        let body = br#"{"code":1,"shop_id":7,"timestamp":1700000000,
            "data":{"code":2,"shop_id":7,"msg":"authorized"}}"#;
        let event = WebhookEvent::from_slice(body).unwrap();

        assert_eq!(event.event_type, "shop.authorization");
        assert_eq!(
            event.payload,
            WebhookPayload::ShopAuthorization(ShopAuthorizationData {
                code: 2,
                shop_id: 7,
                message: "authorized".to_string(),
            })
        );
        assert_eq!(event.order_sn(), None);
        assert_eq!(event.payload_shop_id(), Some(7));
    }

    #[test]
    fn test_tracking_update_payload() {
        let body = br#"{"code":4,"shop_id":9,"timestamp":1700000100,
            "data":{"ordersn":"SN1","tracking_number":"TRK","shop_id":9,
                    "logistics_status":"LOGISTICS_PICKUP_DONE","update_time":1700000099}}"#;
        let event = WebhookEvent::from_slice(body).unwrap();

        match &event.payload {
            WebhookPayload::TrackingUpdate(data) => {
                assert_eq!(data.tracking_number, "TRK");
                assert_eq!(data.logistics_status, "LOGISTICS_PICKUP_DONE");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(event.order_sn(), Some("SN1"));
        assert_eq!(
            event.sent_at().unwrap().to_rfc3339(),
            "2023-11-14T22:15:00+00:00"
        );
    }

    #[test]
    fn test_unknown_code_keeps_generic_map() {
        let body = br#"{"code":42,"shop_id":5,"timestamp":1,"data":{"ordersn":"X","shop_id":5,"extra":true}}"#;
        let event = WebhookEvent::from_slice(body).unwrap();

        assert_eq!(event.code, PushCode::Unknown(42));
        assert_eq!(event.event_type, "unknown.42");
        assert_eq!(event.order_sn(), Some("X"));
        assert_eq!(event.payload_shop_id(), Some(5));
        match event.payload {
            WebhookPayload::Generic(map) => assert_eq!(map["extra"], Value::Bool(true)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_known_code_without_typed_shape_is_generic() {
        let body = br#"{"code":10,"shop_id":5,"timestamp":1}"#;
        let event = WebhookEvent::from_slice(body).unwrap();
        assert_eq!(event.event_type, "webhook.test");
        assert_eq!(event.payload, WebhookPayload::Generic(Map::new()));
        assert_eq!(event.payload_shop_id(), None);
    }

    #[test]
    fn test_typed_code_without_data_is_empty_generic() {
        for code in [1, 3, 4] {
            let body = format!(r#"{{"code":{code},"shop_id":1,"timestamp":1}}"#);
            let event = WebhookEvent::from_slice(body.as_bytes()).unwrap();
            assert_eq!(event.payload, WebhookPayload::Generic(Map::new()), "code {code}");
            assert_eq!(event.order_sn(), None);
        }

        let event =
            WebhookEvent::from_slice(br#"{"code":3,"shop_id":1,"timestamp":1,"data":null}"#).unwrap();
        assert_eq!(event.code, PushCode::OrderStatusUpdate);
        assert_eq!(event.payload, WebhookPayload::Generic(Map::new()));
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            WebhookEvent::from_slice(b"not json"),
            Err(WebhookError::MalformedPayload { .. })
        ));
        // code is required
        assert!(WebhookEvent::from_slice(br#"{"shop_id":1}"#).is_err());
        // typed payload with the wrong shape
        assert!(WebhookEvent::from_slice(br#"{"code":3,"data":{"ordersn":12}}"#).is_err());
        // generic payload that is not an object
        assert!(WebhookEvent::from_slice(br#"{"code":5,"data":[1,2]}"#).is_err());
    }
}
