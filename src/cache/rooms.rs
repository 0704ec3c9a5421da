//! Room configuration cache.
//!
//! Stores the `GET /v1/rooms` body keyed by API key, together with the rooms
//! parsed from it. A body is parsed before it is stored, so an unusable body
//! is never cached. Entries expire absolutely at `fetched_at + ttl`; a zero
//! TTL bypasses the cache entirely. Concurrent refreshes race harmlessly:
//! the last writer wins and every writer stored an equally valid body.

use crate::clock::{Clock, SystemClock};
use crate::protocol::models::{parse_room_config, RoomConfig};
use crate::CrowdgateError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

static GLOBAL_ROOM_CACHE: Lazy<Arc<RoomCache>> = Lazy::new(|| Arc::new(RoomCache::new()));

/// A room list as fetched: the raw body and its parsed rooms.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRooms {
    /// Raw response body.
    pub json: Arc<str>,

    /// Rooms parsed from `json`.
    pub rooms: Arc<Vec<RoomConfig>>,
}

impl CachedRooms {
    /// Parse `json`, failing with `ProtocolError` on an unusable body.
    pub fn parse(json: &str) -> Result<Self, CrowdgateError> {
        let rooms = parse_room_config(json)?;
        Ok(Self {
            json: Arc::from(json),
            rooms: Arc::new(rooms),
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    rooms: CachedRooms,
    expires_at: DateTime<Utc>,
}

/// TTL cache of room configuration.
pub struct RoomCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RoomCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCache").finish_non_exhaustive()
    }
}

impl Default for RoomCache {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(api_key: &str) -> String {
    format!("rooms_{}", api_key)
}

impl RoomCache {
    /// Empty cache on the system clock.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Empty cache on a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// The process-wide cache, created on first use.
    pub fn global() -> Arc<RoomCache> {
        GLOBAL_ROOM_CACHE.clone()
    }

    /// Cached rooms for `api_key`, if present and unexpired.
    pub fn get(&self, api_key: &str) -> Option<CachedRooms> {
        let now = self.clock.now_utc();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&cache_key(api_key))
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.rooms.clone())
    }

    /// Parse `json` and store it for `api_key` until `now + ttl`.
    ///
    /// A zero TTL parses without storing. A body that fails to parse is
    /// returned as an error and nothing is stored.
    pub fn insert(
        &self,
        api_key: &str,
        json: &str,
        ttl: Duration,
    ) -> Result<CachedRooms, CrowdgateError> {
        let rooms = CachedRooms::parse(json)?;

        if ttl.is_zero() {
            return Ok(rooms);
        }
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return Ok(rooms);
        };
        let expires_at = self.clock.now_utc() + ttl;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            cache_key(api_key),
            CacheEntry {
                rooms: rooms.clone(),
                expires_at,
            },
        );
        Ok(rooms)
    }

    /// Return the cached rooms or call `fetch` and cache its body.
    ///
    /// Fetch and parse errors are returned as-is and nothing is cached.
    pub fn get_or_fetch<F>(
        &self,
        api_key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<CachedRooms, CrowdgateError>
    where
        F: FnOnce() -> Result<String, CrowdgateError>,
    {
        if !ttl.is_zero() {
            if let Some(rooms) = self.get(api_key) {
                debug!("room config served from cache");
                return Ok(rooms);
            }
        }

        let json = fetch()?;
        self.insert(api_key, &json, ttl)
    }

    /// Drop the entry for `api_key`.
    pub fn invalidate(&self, api_key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&cache_key(api_key));
    }
}
