//! Validated newtype wrappers for configuration values.
//!
//! This module provides type-safe wrappers around raw values that validate
//! their contents on construction. Invalid values are rejected with clear error messages.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A validated Open Platform partner ID.
///
/// Partner IDs are positive integers assigned when an app is registered.
///
/// # Example
///
/// ```rust
/// use marketplace_api::PartnerId;
///
/// let id = PartnerId::new(2_001_234).unwrap();
/// assert_eq!(id.get(), 2_001_234);
///
/// let parsed: PartnerId = "2001234".parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartnerId(i64);

impl PartnerId {
    /// Creates a new validated partner ID.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPartnerId`] if the ID is not positive.
    pub fn new(id: i64) -> Result<Self, ConfigError> {
        if id <= 0 {
            return Err(ConfigError::InvalidPartnerId {
                value: id.to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the raw partner ID.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for PartnerId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidPartnerId {
                value: s.to_string(),
            })?;
        Self::new(id)
    }
}

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PartnerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for PartnerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = i64::deserialize(deserializer)?;
        Self::new(id).map_err(de::Error::custom)
    }
}

/// A validated partner key (the shared HMAC secret).
///
/// This newtype ensures the key is non-empty and masks its value
/// in debug output to prevent accidental exposure in logs.
///
/// # Example
///
/// ```rust
/// use marketplace_api::PartnerKey;
///
/// let key = PartnerKey::new("my-partner-key").unwrap();
/// assert_eq!(format!("{:?}", key), "PartnerKey(*****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PartnerKey(String);

impl PartnerKey {
    /// Creates a new validated partner key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPartnerKey`] if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyPartnerKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for PartnerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PartnerKey(*****)")
    }
}

/// A validated base URL for API or callback endpoints.
///
/// The URL must carry a scheme and a host. A trailing slash is stripped so
/// that request paths (which always begin with `/`) can be appended directly.
///
/// # Example
///
/// ```rust
/// use marketplace_api::BaseUrl;
///
/// let url = BaseUrl::new("https://partner.shopeemobile.com/").unwrap();
/// assert_eq!(url.as_ref(), "https://partner.shopeemobile.com");
/// assert_eq!(url.scheme(), "https");
/// assert_eq!(url.host_name(), "partner.shopeemobile.com");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl {
    url: String,
    scheme_end: usize,
    host_start: usize,
    host_end: usize,
}

impl BaseUrl {
    /// Creates a new validated base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL has no scheme or host.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let url = url.trim().trim_end_matches('/').to_string();

        let scheme_end = url
            .find("://")
            .ok_or_else(|| ConfigError::InvalidBaseUrl { url: url.clone() })?;

        let scheme = &url[..scheme_end];
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidBaseUrl { url: url.clone() });
        }

        let host_start = scheme_end + 3;
        if host_start >= url.len() {
            return Err(ConfigError::InvalidBaseUrl { url: url.clone() });
        }

        let remainder = &url[host_start..];
        let host_end = remainder
            .find([':', '/', '?', '#'])
            .map_or(url.len(), |i| host_start + i);

        if host_end == host_start {
            return Err(ConfigError::InvalidBaseUrl { url: url.clone() });
        }

        Ok(Self {
            url,
            scheme_end,
            host_start,
            host_end,
        })
    }

    /// Returns the URL scheme (e.g., "https").
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.url[..self.scheme_end]
    }

    /// Returns the host name portion of the URL.
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.url[self.host_start..self.host_end]
    }
}

impl AsRef<str> for BaseUrl {
    fn as_ref(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_id_rejects_non_positive() {
        assert!(matches!(
            PartnerId::new(0),
            Err(ConfigError::InvalidPartnerId { .. })
        ));
        assert!(PartnerId::new(-5).is_err());
        assert_eq!(PartnerId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn test_partner_id_parses_from_string() {
        let id: PartnerId = " 1000 ".parse().unwrap();
        assert_eq!(id.get(), 1000);

        let result = "not-a-number".parse::<PartnerId>();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidPartnerId { value }) if value == "not-a-number"
        ));
    }

    #[test]
    fn test_partner_id_deserialize_validates() {
        let id: PartnerId = serde_json::from_str("123").unwrap();
        assert_eq!(id.get(), 123);
        assert!(serde_json::from_str::<PartnerId>("0").is_err());
    }

    #[test]
    fn test_partner_key_rejects_empty_string() {
        assert!(matches!(
            PartnerKey::new(""),
            Err(ConfigError::EmptyPartnerKey)
        ));
    }

    #[test]
    fn test_partner_key_masks_value_in_debug() {
        let key = PartnerKey::new("super-secret-key").unwrap();
        let debug_output = format!("{key:?}");
        assert_eq!(debug_output, "PartnerKey(*****)");
        assert!(!debug_output.contains("super-secret-key"));
    }

    #[test]
    fn test_base_url_validates_format() {
        let url = BaseUrl::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_name(), "127.0.0.1");

        let url = BaseUrl::new("https://example.com/webhooks/shopee").unwrap();
        assert_eq!(url.host_name(), "example.com");
        assert_eq!(url.as_ref(), "https://example.com/webhooks/shopee");
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let url = BaseUrl::new("https://example.com///").unwrap();
        assert_eq!(url.as_ref(), "https://example.com");
    }

    #[test]
    fn test_base_url_rejects_invalid() {
        assert!(BaseUrl::new("example.com").is_err());
        assert!(BaseUrl::new("https://").is_err());
        assert!(BaseUrl::new("://example.com").is_err());
    }
}
