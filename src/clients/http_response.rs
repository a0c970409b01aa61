//! Response types for marketplace API calls.
//!
//! Every Open Platform response shares a common envelope:
//!
//! ```json
//! { "error": "", "message": "", "warning": "", "request_id": "…", "response": { … } }
//! ```
//!
//! An `error` of `""` or `"success"` means the call succeeded, even though the
//! HTTP status of a failed call is frequently still 200. [`Response::classify`]
//! turns the envelope and status into an [`ApiError`] when either reports a
//! failure.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clients::errors::{ApiError, ErrorCode};

/// Common fields of every response body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseResponse {
    /// Platform error code; empty or `success` when the call succeeded.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Non-fatal warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Platform request ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl BaseResponse {
    /// Returns `true` if the envelope reports a failure.
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.error.is_empty() && self.error != "success"
    }

    /// Returns the message, falling back to the error code.
    #[must_use]
    pub fn error_message(&self) -> &str {
        if self.message.is_empty() {
            &self.error
        } else {
            &self.message
        }
    }

    /// Converts the envelope into an [`ApiError`] for the given HTTP status.
    #[must_use]
    pub fn to_api_error(&self, http_status: u16) -> ApiError {
        let error = ApiError::new(ErrorCode::from(self.error.as_str()), &self.message, http_status);
        match &self.request_id {
            Some(request_id) => error.with_request_id(request_id.as_str()),
            None => error,
        }
    }
}

/// A response from the marketplace.
///
/// Only successful responses reach callers; failures are returned as
/// [`ApiError`](crate::clients::ApiError) through
/// [`ClientError::Api`](crate::clients::ClientError::Api).
#[derive(Clone, Debug)]
pub struct Response {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names (headers may repeat).
    pub headers: HashMap<String, Vec<String>>,
    /// The parsed body.
    pub body: serde_json::Value,
    /// Platform request ID from the envelope.
    pub request_id: Option<String>,
    /// Non-fatal warning from the envelope.
    pub warning: Option<String>,
}

impl Response {
    /// Creates a response, lifting `request_id` and `warning` out of the body.
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, Vec<String>>, body: serde_json::Value) -> Self {
        let envelope = Self::envelope_of(&body);
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            status,
            headers,
            request_id: non_empty(envelope.request_id),
            warning: non_empty(envelope.warning),
            body,
        }
    }

    /// Parses a raw body into JSON.
    ///
    /// An empty body becomes `{}`; a body that is not JSON is kept under
    /// `raw_body` so that it can still be logged and classified.
    #[must_use]
    pub fn parse_body(text: &str) -> serde_json::Value {
        if text.trim().is_empty() {
            return serde_json::json!({});
        }
        serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "raw_body": text }))
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status <= 299
    }

    /// Returns the first value of a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the common envelope fields.
    #[must_use]
    pub fn envelope(&self) -> BaseResponse {
        Self::envelope_of(&self.body)
    }

    /// Classifies the response.
    ///
    /// A failing envelope wins; otherwise any HTTP status of 400 or above is
    /// reported as a server-category error.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] describing the failure.
    pub fn classify(&self) -> Result<(), ApiError> {
        let envelope = self.envelope();
        if envelope.has_error() {
            return Err(envelope.to_api_error(self.status));
        }
        if self.status >= 400 {
            return Err(ApiError::new(
                ErrorCode::Server,
                format!("HTTP error: {}", self.status),
                self.status,
            ));
        }
        Ok(())
    }

    /// Deserializes the whole body.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    /// Returns the `response` object of the envelope, if present.
    #[must_use]
    pub fn response_field(&self) -> Option<&serde_json::Value> {
        self.body.get("response")
    }

    fn envelope_of(body: &serde_json::Value) -> BaseResponse {
        BaseResponse::deserialize(body).unwrap_or_default()
    }
}
