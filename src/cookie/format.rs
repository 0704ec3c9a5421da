//! Visitor cookie payload.
//!
//! The cookie carries everything needed to re-validate a visitor without a
//! round trip to the queueing service:
//! - The token the service issued
//! - Every signature seen for that token, with its generation time
//! - When the token was last validated, plus a keyed hash of that time
//!
//! Only the last token in `tokens` is ever read or changed. The payload is
//! JSON, percent-escaped when stored as a cookie value.

use crate::clock::to_unix_seconds;
use crate::crypto::signature::touched_signature;
use crate::CrowdgateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name hosts should store the payload under.
pub const COOKIE_NAME: &str = "crowdhandler";

/// Integration identifier written into new payloads.
pub const DEFAULT_INTEGRATION: &str = "rust";

/// One signature observed for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSignature {
    /// When the signature was generated.
    pub gen: DateTime<Utc>,

    /// Hex signature.
    pub sig: String,
}

/// A token and its validation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieToken {
    /// Token issued by the queueing service.
    pub token: String,

    /// Unix seconds of the last successful validation.
    #[serde(default)]
    pub touched: u64,

    /// Keyed hash binding `touched` to the private key.
    #[serde(default)]
    pub touched_sig: String,

    /// Signatures for this token, newest last.
    #[serde(default)]
    pub signatures: Vec<CookieSignature>,
}

impl CookieToken {
    /// Start a token entry, optionally seeded with its first signature.
    pub fn new(token: &str, signature: Option<CookieSignature>) -> Self {
        Self {
            token: token.to_string(),
            touched: 0,
            touched_sig: String::new(),
            signatures: signature.into_iter().collect(),
        }
    }

    /// Whether `sig` is already recorded.
    pub fn has_signature(&self, sig: &str) -> bool {
        self.signatures.iter().any(|s| s.sig == sig)
    }

    /// Append a signature unless it is already present.
    pub fn add_signature(&mut self, signature: CookieSignature) {
        if !self.has_signature(&signature.sig) {
            self.signatures.push(signature);
        }
    }

    /// Refresh `touched` and its keyed hash. The two are never set apart.
    pub fn touch(&mut self, hashed_private_key: &str, now: &DateTime<Utc>) {
        self.touched = to_unix_seconds(now);
        self.touched_sig = touched_signature(hashed_private_key, self.touched);
    }
}

/// Persisted validation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieState {
    /// Which client wrote the payload.
    #[serde(default)]
    pub integration: String,

    /// Token history; the last entry is the visitor's current identity.
    #[serde(default)]
    pub tokens: Vec<CookieToken>,
}

impl CookieState {
    /// Empty state tagged with the given integration name.
    pub fn new(integration: &str) -> Self {
        Self {
            integration: integration.to_string(),
            tokens: Vec::new(),
        }
    }

    /// Current identity.
    pub fn active_token(&self) -> Option<&CookieToken> {
        self.tokens.last()
    }

    /// Mutable access to the current identity.
    pub fn active_token_mut(&mut self) -> Option<&mut CookieToken> {
        self.tokens.last_mut()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, CrowdgateError> {
        serde_json::to_string(self)
            .map_err(|e| CrowdgateError::CookieInvalid(format!("Failed to serialize: {}", e)))
    }

    /// Deserialize from JSON. Empty input means no state.
    pub fn from_json(json: &str) -> Result<Option<Self>, CrowdgateError> {
        if json.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(json)
            .map(Some)
            .map_err(|e| CrowdgateError::CookieInvalid(format!("Failed to deserialize: {}", e)))
    }

    /// JSON, percent-escaped for use as a cookie value.
    pub fn to_cookie_value(&self) -> Result<String, CrowdgateError> {
        Ok(urlencoding::encode(&self.to_json()?).into_owned())
    }

    /// Decode a stored cookie value. Accepts escaped or plain JSON.
    pub fn from_cookie_value(value: &str) -> Result<Option<Self>, CrowdgateError> {
        let json = urlencoding::decode(value)
            .map_err(|e| CrowdgateError::CookieInvalid(format!("Invalid escaping: {}", e)))?;
        Self::from_json(&json)
    }
}
