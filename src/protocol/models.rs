//! Queue API response structs.

use crate::CrowdgateError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How a room's `urlPattern` is applied to a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Regex search against path and query.
    Regex,
    /// Plain substring test.
    Contains,
    /// Every path on the domain.
    All,
    /// Anything the service sends that we do not understand. Never matches.
    #[serde(other)]
    Unknown,
}

/// A waiting-room configuration as returned by `GET /v1/rooms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    /// Room identifier, used in redirect URLs and signatures.
    pub slug: String,

    /// Scheme and host the room applies to, e.g. `https://shop.example`.
    pub domain: String,

    /// Pattern interpreted according to `pattern_type`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_pattern: String,

    /// Matching strategy.
    #[serde(alias = "PatternType")]
    pub pattern_type: PatternType,

    /// Regex identifying checkout URLs on this domain.
    #[serde(default)]
    pub checkout: Option<String>,

    /// Activation time; part of every signature for this room.
    pub queue_activates_on: DateTime<Utc>,

    /// Signature validity window in minutes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timeout: i64,

    /// Service-side TTL hint.
    #[serde(default, deserialize_with = "null_as_default")]
    pub ttl: i64,

    /// Whether the room is running in safety mode.
    #[serde(default, deserialize_with = "null_as_default")]
    pub safety_mode: bool,
}

/// Token issued (or re-checked) by `/v1/requests/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Service status code.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,

    /// Visitor token.
    pub token: String,

    /// `false` means the visitor is still queued.
    #[serde(default, deserialize_with = "null_as_default")]
    pub promoted: bool,

    /// Redirect hint from the service.
    #[serde(default)]
    pub url_redirect: Option<String>,

    /// Room the visitor should be sent to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,

    /// Service correlation id.
    #[serde(default, rename = "responseID")]
    pub response_id: Option<String>,

    /// Timestamp the issued signature represents.
    #[serde(default)]
    pub requested: Option<DateTime<Utc>>,

    /// Signature for the freshly issued token.
    #[serde(default)]
    pub hash: Option<String>,
}

/// Every queue API payload is wrapped in `{"result": ...}`.
#[derive(Debug, Deserialize)]
struct ResultEnvelope<T> {
    result: Option<T>,
}

/// Parse a `{"result": T}` envelope, failing on empty bodies or a missing result.
pub fn parse_result<T: DeserializeOwned>(body: &str) -> Result<T, CrowdgateError> {
    if body.trim().is_empty() {
        return Err(CrowdgateError::ProtocolError(
            "Empty response body".to_string(),
        ));
    }

    let envelope: ResultEnvelope<T> = serde_json::from_str(body)
        .map_err(|e| CrowdgateError::ProtocolError(format!("Failed to parse response: {}", e)))?;

    envelope
        .result
        .ok_or_else(|| CrowdgateError::ProtocolError("Response missing result".to_string()))
}

/// Parse a token response body.
pub fn parse_token_response(body: &str) -> Result<TokenResponse, CrowdgateError> {
    parse_result(body)
}

/// Parse a room list body.
pub fn parse_room_config(body: &str) -> Result<Vec<RoomConfig>, CrowdgateError> {
    parse_result(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ROOMS_RESPONSE: &str = r#"{
        "result": [
            {
                "slug": "sale",
                "domain": "https://shop.test",
                "urlPattern": "/products/.*",
                "patternType": "regex",
                "checkout": "^/checkout/complete",
                "queueActivatesOn": "2023-01-01T00:00:00Z",
                "timeout": 30,
                "ttl": 60,
                "safetyMode": true
            },
            {
                "slug": "legacy",
                "domain": "https://other.test",
                "urlPattern": "",
                "PatternType": "all",
                "queueActivatesOn": "2023-06-01T12:00:00Z",
                "timeout": 20
            }
        ]
    }"#;

    const TOKEN_RESPONSE: &str = r#"{
        "result": {
            "status": 1,
            "token": "tok123",
            "promoted": true,
            "slug": "sale",
            "responseID": "resp-1",
            "requested": "2024-01-01T00:00:00Z",
            "hash": "abcdef",
            "position": 12
        }
    }"#;

    #[test]
    fn test_parse_rooms() {
        let rooms = parse_room_config(ROOMS_RESPONSE).unwrap();
        assert_eq!(rooms.len(), 2);

        let sale = &rooms[0];
        assert_eq!(sale.slug, "sale");
        assert_eq!(sale.pattern_type, PatternType::Regex);
        assert_eq!(sale.checkout.as_deref(), Some("^/checkout/complete"));
        assert_eq!(
            sale.queue_activates_on,
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(sale.safety_mode);

        let legacy = &rooms[1];
        assert_eq!(legacy.pattern_type, PatternType::All);
        assert!(legacy.checkout.is_none());
        assert!(!legacy.safety_mode);
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let body = r#"{"result": [{
            "slug": "n", "domain": "https://a.test", "urlPattern": null,
            "patternType": "all", "checkout": null, "queueActivatesOn": "2023-01-01T00:00:00Z",
            "timeout": null, "ttl": null, "safetyMode": null
        }]}"#;
        let rooms = parse_room_config(body).unwrap();
        assert_eq!(rooms[0].url_pattern, "");
        assert_eq!(rooms[0].timeout, 0);
        assert_eq!(rooms[0].ttl, 0);
        assert!(!rooms[0].safety_mode);
        assert!(rooms[0].checkout.is_none());
    }

    #[test]
    fn test_null_token_fields_take_defaults() {
        let body = r#"{"result": {"status": null, "token": "t", "promoted": null, "slug": null}}"#;
        let token = parse_token_response(body).unwrap();
        assert_eq!(token.status, 0);
        assert!(!token.promoted);
        assert_eq!(token.slug, "");
    }

    #[test]
    fn test_unknown_pattern_type_is_tolerated() {
        let body = r#"{"result": [{
            "slug": "x", "domain": "https://a.test", "urlPattern": "/",
            "patternType": "glob", "queueActivatesOn": "2023-01-01T00:00:00Z", "timeout": 5
        }]}"#;
        let rooms = parse_room_config(body).unwrap();
        assert_eq!(rooms[0].pattern_type, PatternType::Unknown);
    }

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(TOKEN_RESPONSE).unwrap();
        assert_eq!(token.token, "tok123");
        assert!(token.promoted);
        assert_eq!(token.response_id.as_deref(), Some("resp-1"));
        assert_eq!(token.hash.as_deref(), Some("abcdef"));
        assert_eq!(
            token.requested,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_queued_token_response_without_hash() {
        let body = r#"{"result": {"token": "tokQ", "promoted": false, "slug": "sale"}}"#;
        let token = parse_token_response(body).unwrap();
        assert!(!token.promoted);
        assert!(token.hash.is_none());
        assert!(token.requested.is_none());
    }

    #[test]
    fn test_empty_body_is_protocol_error() {
        let result = parse_token_response("   ");
        assert!(matches!(result, Err(CrowdgateError::ProtocolError(_))));
    }

    #[test]
    fn test_malformed_body_is_protocol_error() {
        let result = parse_room_config("<html>bad gateway</html>");
        assert!(matches!(result, Err(CrowdgateError::ProtocolError(_))));
    }

    #[test]
    fn test_missing_result_is_protocol_error() {
        let result = parse_token_response(r#"{"error": "nope"}"#);
        assert!(matches!(result, Err(CrowdgateError::ProtocolError(_))));

        let result = parse_room_config(r#"{"result": null}"#);
        assert!(matches!(result, Err(CrowdgateError::ProtocolError(_))));
    }
}
