//! Reqwest-based HTTP client for the queueing service API.
//!
//! Every call goes through [`ApiClient::do_request`]: a pooled client is
//! borrowed, the request is built fresh for each attempt, and timeouts are
//! retried up to [`MAX_ATTEMPTS`] times. Anything else fails immediately.

use crate::cache::rooms::{CachedRooms, RoomCache};
use crate::client::api::{supplied_token, QueueApi};
use crate::client::pool::ClientPool;
use crate::config::CrowdgateConfig;
use crate::protocol::models::{parse_token_response, RoomConfig, TokenResponse};
use crate::CrowdgateError;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the public API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Attempts per request when the transport times out.
pub const MAX_ATTEMPTS: u32 = 3;

fn transport_error(e: reqwest::Error, what: &str) -> CrowdgateError {
    if e.is_timeout() {
        CrowdgateError::Timeout(format!("{}: {}", what, e))
    } else {
        CrowdgateError::Transport(format!("{}: {}", what, e))
    }
}

/// HTTP client for the queueing service.
pub struct ApiClient {
    api_url: String,
    api_key: String,
    pool: ClientPool,
    cache: Arc<RoomCache>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("pool", &self.pool)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client using the process-wide room cache.
    pub fn new(config: &CrowdgateConfig) -> Self {
        Self::with_cache(config, RoomCache::global())
    }

    /// Create a client with an explicit room cache.
    pub fn with_cache(config: &CrowdgateConfig, cache: Arc<RoomCache>) -> Self {
        Self {
            api_url: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key: config.public_key.clone(),
            pool: ClientPool::new(config.request_timeout),
            cache,
            cache_ttl: config.room_cache_ttl,
        }
    }

    /// Configured API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn ensure_configured(&self) -> Result<(), CrowdgateError> {
        if self.api_url.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "API endpoint cannot be empty".to_string(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(CrowdgateError::ConfigError(
                "API key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Request a new token (POST) or re-check an existing one (GET).
    pub fn get_token(
        &self,
        url: &str,
        user_agent: &str,
        language: &str,
        ip: &str,
        token: Option<&str>,
    ) -> Result<TokenResponse, CrowdgateError> {
        self.ensure_configured()?;

        let params = [("url", url), ("agent", user_agent), ("lang", language), ("ip", ip)];

        let body = match supplied_token(token) {
            None => {
                let endpoint = format!("{}/v1/requests/", self.api_url);
                debug!(%endpoint, "requesting new token");
                self.do_request(|client| client.post(&endpoint).form(&params))?
            }
            Some(token) => {
                let endpoint = format!(
                    "{}/v1/requests/{}",
                    self.api_url,
                    urlencoding::encode(token)
                );
                debug!(%endpoint, "checking existing token");
                self.do_request(|client| client.get(&endpoint).query(&params))?
            }
        };

        parse_token_response(&body)
    }

    /// Room configuration, served from the cache when fresh.
    ///
    /// Bodies that fail to parse are never cached.
    pub fn cached_rooms(&self) -> Result<CachedRooms, CrowdgateError> {
        self.ensure_configured()?;

        self.cache.get_or_fetch(&self.api_key, self.cache_ttl, || {
            let endpoint = format!("{}/v1/rooms", self.api_url);
            debug!(%endpoint, "fetching room config");
            self.do_request(|client| client.get(&endpoint))
        })
    }

    /// Raw room configuration body.
    pub fn room_config_json(&self) -> Result<String, CrowdgateError> {
        Ok(self.cached_rooms()?.json.to_string())
    }

    /// Parsed room configuration.
    pub fn room_config(&self) -> Result<Arc<Vec<RoomConfig>>, CrowdgateError> {
        Ok(self.cached_rooms()?.rooms)
    }

    /// Execute a request built by `build`, retrying timeouts.
    ///
    /// `build` runs once per attempt because a sent request cannot be
    /// replayed. The API key header is attached here, per request, never
    /// to the pooled client.
    pub fn do_request<F>(&self, build: F) -> Result<String, CrowdgateError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(&build) {
                Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, max_attempts = MAX_ATTEMPTS, error = %e, "queue API timed out, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn attempt<F>(&self, build: &F) -> Result<String, CrowdgateError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let client = self.pool.get()?;

        let response = build(&*client)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| transport_error(e, "Request failed"))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| transport_error(e, "Failed to read body"))?;

        if !status.is_success() {
            return Err(CrowdgateError::ProtocolError(format!(
                "Unexpected status {} from queue API",
                status.as_u16()
            )));
        }

        Ok(body)
    }
}

impl QueueApi for ApiClient {
    fn get_token(
        &self,
        url: &str,
        user_agent: &str,
        language: &str,
        ip: &str,
        token: Option<&str>,
    ) -> Result<TokenResponse, CrowdgateError> {
        ApiClient::get_token(self, url, user_agent, language, ip, token)
    }

    fn room_config(&self) -> Result<Arc<Vec<RoomConfig>>, CrowdgateError> {
        ApiClient::room_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrowdgateConfig {
        CrowdgateConfig::new("pub-key", "priv-key")
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let mut config = config();
        config.api_endpoint = "https://api.test/".to_string();
        let client = ApiClient::with_cache(&config, Arc::new(RoomCache::new()));
        assert_eq!(client.api_url(), "https://api.test");
    }

    #[test]
    fn test_empty_api_key_is_config_error() {
        let mut config = config();
        config.public_key = String::new();
        let client = ApiClient::with_cache(&config, Arc::new(RoomCache::new()));

        let result = client.get_token("https://shop.test/", "ua", "en", "1.2.3.4", None);
        assert!(matches!(result, Err(CrowdgateError::ConfigError(_))));
        assert!(matches!(
            client.room_config(),
            Err(CrowdgateError::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_api_url_is_config_error() {
        let mut config = config();
        config.api_endpoint = String::new();
        let client = ApiClient::with_cache(&config, Arc::new(RoomCache::new()));

        let result = client.room_config_json();
        assert!(matches!(result, Err(CrowdgateError::ConfigError(_))));
    }

    #[test]
    fn test_cached_rooms_served_without_network() {
        // Unroutable endpoint: any network call would fail.
        let mut config = config();
        config.api_endpoint = "http://127.0.0.1:9".to_string();
        let cache = Arc::new(RoomCache::new());
        cache
            .insert("pub-key", r#"{"result": []}"#, Duration::from_secs(60))
            .unwrap();

        let client = ApiClient::with_cache(&config, cache);
        assert!(client.room_config().unwrap().is_empty());
    }
}
