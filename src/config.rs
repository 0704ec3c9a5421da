//! Crowdgate configuration.

use crate::policy::exclusion::{ExclusionFilter, DEFAULT_EXCLUSIONS};
use crate::CrowdgateError;
use std::time::Duration;
use tracing::warn;

/// Default queueing service base URL.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.crowdhandler.com";

/// Default waiting room base URL.
pub const DEFAULT_WAITING_ROOM_ENDPOINT: &str = "https://wait.crowdhandler.com";

/// Default per-request timeout for queue API calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Default room configuration cache lifetime.
pub const DEFAULT_ROOM_CACHE_TTL: Duration = Duration::from_secs(60);

/// Setting names understood by [`CrowdgateConfig::from_lookup`].
pub mod keys {
    /// Public API key (required).
    pub const PUBLIC_KEY: &str = "CROWDHANDLER_PUBLIC_KEY";
    /// Private API key (required).
    pub const PRIVATE_KEY: &str = "CROWDHANDLER_PRIVATE_KEY";
    /// Queue API base URL.
    pub const API_ENDPOINT: &str = "CROWDHANDLER_API_ENDPOINT";
    /// Waiting room base URL.
    pub const WR_ENDPOINT: &str = "CROWDHANDLER_WR_ENDPOINT";
    /// Exclusion regex.
    pub const EXCLUSIONS: &str = "CROWDHANDLER_EXCLUSIONS";
    /// Per-request timeout in seconds.
    pub const API_REQUEST_TIMEOUT: &str = "CROWDHANDLER_API_REQUEST_TIMEOUT";
    /// Room cache TTL in seconds; `0` disables caching.
    pub const ROOM_CACHE_TIME: &str = "CROWDHANDLER_ROOM_CACHE_TIME";
    /// Room visitors are parked in when validation fails.
    pub const SAFETYNET_SLUG: &str = "CROWDHANDLER_SAFETYNET_SLUG";
}

/// Whether a missing setting is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing or empty is a `ConfigError`.
    Required,
    /// Missing or empty yields `None`.
    Optional,
}

/// Look up one setting. Empty values count as missing.
pub fn lookup_setting<F>(
    lookup: &F,
    name: &str,
    requirement: Requirement,
) -> Result<Option<String>, CrowdgateError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).filter(|v| !v.trim().is_empty());
    match (value, requirement) {
        (None, Requirement::Required) => Err(CrowdgateError::ConfigError(format!(
            "required setting {} is missing",
            name
        ))),
        (value, _) => Ok(value),
    }
}

fn seconds_setting<F>(lookup: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(setting = name, value = %raw, "unparseable seconds value, using default");
                default
            }
        },
    }
}

/// Configuration for the admission engine.
///
/// The host loads these values however it likes; [`CrowdgateConfig::from_env`]
/// covers the common case.
#[derive(Clone)]
pub struct CrowdgateConfig {
    /// Public API key, sent as `x-api-key` and echoed in redirect URLs.
    pub public_key: String,

    /// Private API key. Never leaves the process; only its hash is used.
    pub private_key: String,

    /// Queue API base URL.
    pub api_endpoint: String,

    /// Waiting room base URL, e.g. `https://wait.example.com`.
    pub waiting_room_endpoint: String,

    /// Regex of paths that bypass admission control entirely.
    pub exclusions: Option<String>,

    /// Timeout for each queue API attempt.
    pub request_timeout: Duration,

    /// Room configuration cache lifetime. Zero disables the cache.
    pub room_cache_ttl: Duration,

    /// Integration name written into cookie payloads.
    pub integration: String,

    /// Safety-net room for failed validations; `None` trusts the visitor.
    pub safety_net_slug: Option<String>,
}

impl std::fmt::Debug for CrowdgateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdgateConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .field("waiting_room_endpoint", &self.waiting_room_endpoint)
            .field("exclusions", &self.exclusions)
            .field("request_timeout", &self.request_timeout)
            .field("room_cache_ttl", &self.room_cache_ttl)
            .field("integration", &self.integration)
            .field("safety_net_slug", &self.safety_net_slug)
            .finish()
    }
}

impl CrowdgateConfig {
    /// Configuration with both keys set and every other value defaulted.
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            waiting_room_endpoint: DEFAULT_WAITING_ROOM_ENDPOINT.to_string(),
            exclusions: Some(DEFAULT_EXCLUSIONS.to_string()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            room_cache_ttl: DEFAULT_ROOM_CACHE_TTL,
            integration: crate::cookie::format::DEFAULT_INTEGRATION.to_string(),
            safety_net_slug: None,
        }
    }

    /// Build from a settings lookup (environment, app settings, a map...).
    ///
    /// # Errors
    /// `ConfigError` when a required key is missing or the result fails
    /// [`validate`](Self::validate).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CrowdgateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let public_key = lookup_setting(&lookup, keys::PUBLIC_KEY, Requirement::Required)?;
        let private_key = lookup_setting(&lookup, keys::PRIVATE_KEY, Requirement::Required)?;

        let mut config = Self::new(
            public_key.unwrap_or_default(),
            private_key.unwrap_or_default(),
        );

        if let Some(api) = lookup_setting(&lookup, keys::API_ENDPOINT, Requirement::Optional)? {
            config.api_endpoint = api;
        }
        if let Some(wr) = lookup_setting(&lookup, keys::WR_ENDPOINT, Requirement::Optional)? {
            config.waiting_room_endpoint = wr;
        }
        if let Some(ex) = lookup_setting(&lookup, keys::EXCLUSIONS, Requirement::Optional)? {
            config.exclusions = Some(ex);
        }
        config.safety_net_slug =
            lookup_setting(&lookup, keys::SAFETYNET_SLUG, Requirement::Optional)?;
        config.request_timeout =
            seconds_setting(&lookup, keys::API_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT);
        config.room_cache_ttl =
            seconds_setting(&lookup, keys::ROOM_CACHE_TIME, DEFAULT_ROOM_CACHE_TTL);

        config.validate()?;
        Ok(config)
    }

    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, CrowdgateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), CrowdgateError> {
        if self.public_key.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "public_key cannot be empty".to_string(),
            ));
        }
        if self.private_key.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "private_key cannot be empty".to_string(),
            ));
        }
        if self.api_endpoint.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "api_endpoint cannot be empty".to_string(),
            ));
        }
        if self.waiting_room_endpoint.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "waiting_room_endpoint cannot be empty".to_string(),
            ));
        }
        ExclusionFilter::new(self.exclusions.as_deref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CrowdgateConfig::new("pub", "priv");
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.waiting_room_endpoint, DEFAULT_WAITING_ROOM_ENDPOINT);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.room_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.integration, "rust");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_full() {
        let config = CrowdgateConfig::from_lookup(lookup_from(&[
            (keys::PUBLIC_KEY, "pub"),
            (keys::PRIVATE_KEY, "priv"),
            (keys::API_ENDPOINT, "https://api.test"),
            (keys::WR_ENDPOINT, "https://wait.test"),
            (keys::EXCLUSIONS, r"\.css$"),
            (keys::API_REQUEST_TIMEOUT, "5"),
            (keys::ROOM_CACHE_TIME, "0"),
            (keys::SAFETYNET_SLUG, "safety"),
        ]))
        .unwrap();

        assert_eq!(config.api_endpoint, "https://api.test");
        assert_eq!(config.waiting_room_endpoint, "https://wait.test");
        assert_eq!(config.exclusions.as_deref(), Some(r"\.css$"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.room_cache_ttl, Duration::ZERO);
        assert_eq!(config.safety_net_slug.as_deref(), Some("safety"));
    }

    #[test]
    fn test_safety_net_slug_optional() {
        let config = CrowdgateConfig::from_lookup(lookup_from(&[
            (keys::PUBLIC_KEY, "pub"),
            (keys::PRIVATE_KEY, "priv"),
            (keys::SAFETYNET_SLUG, ""),
        ]))
        .unwrap();
        assert!(config.safety_net_slug.is_none());
    }

    #[test]
    fn test_missing_required_key() {
        let result = CrowdgateConfig::from_lookup(lookup_from(&[(keys::PUBLIC_KEY, "pub")]));
        match result {
            Err(CrowdgateError::ConfigError(msg)) => assert!(msg.contains(keys::PRIVATE_KEY)),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = CrowdgateConfig::from_lookup(lookup_from(&[
            (keys::PUBLIC_KEY, "pub"),
            (keys::PRIVATE_KEY, "priv"),
            (keys::API_REQUEST_TIMEOUT, "soon"),
            (keys::ROOM_CACHE_TIME, "-1"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.room_cache_ttl, DEFAULT_ROOM_CACHE_TTL);
    }

    #[test]
    fn test_optional_lookup() {
        let lookup = lookup_from(&[("SET", "value"), ("BLANK", "  ")]);
        assert_eq!(
            lookup_setting(&lookup, "SET", Requirement::Optional).unwrap(),
            Some("value".to_string())
        );
        assert_eq!(lookup_setting(&lookup, "BLANK", Requirement::Optional).unwrap(), None);
        assert!(lookup_setting(&lookup, "BLANK", Requirement::Required).is_err());
    }

    #[test]
    fn test_invalid_exclusion_fails_validation() {
        let mut config = CrowdgateConfig::new("pub", "priv");
        config.exclusions = Some("([".to_string());
        assert!(matches!(
            config.validate(),
            Err(CrowdgateError::ConfigError(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = CrowdgateConfig::new("pub", "super-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
