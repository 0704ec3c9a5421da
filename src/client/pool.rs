//! Timed pool of HTTP clients.
//!
//! Clients are borrowed for one request and handed back on drop. Idle
//! clients older than the pool lifetime are discarded instead of reused,
//! which bounds how long any one connection set lives.
//!
//! Pooled clients are shared across callers, so they carry only the
//! timeout. Anything per call (API key header, body) goes on the request.

use crate::clock::{Clock, SystemClock};
use crate::CrowdgateError;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How long a client may be reused before it is recycled.
pub const CLIENT_LIFETIME: Duration = Duration::from_secs(5 * 60);

struct PooledEntry {
    client: Client,
    created_at: DateTime<Utc>,
}

/// Pool of blocking reqwest clients.
pub struct ClientPool {
    idle: Mutex<Vec<PooledEntry>>,
    timeout: Duration,
    lifetime: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("timeout", &self.timeout)
            .field("lifetime", &self.lifetime)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A client on loan from a [`ClientPool`].
pub struct PooledClient<'a> {
    pool: &'a ClientPool,
    entry: Option<PooledEntry>,
}

impl PooledClient<'_> {
    /// When the underlying client was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.entry
            .as_ref()
            .map(|e| e.created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        match self.entry.as_ref() {
            Some(entry) => &entry.client,
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry);
        }
    }
}

impl ClientPool {
    /// Create a pool whose clients use `timeout` per request.
    pub fn new(timeout: Duration) -> Self {
        Self::build(timeout, CLIENT_LIFETIME, Arc::new(SystemClock))
    }

    /// Create a pool with a custom lifetime and clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn with_clock(timeout: Duration, lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::build(timeout, lifetime, clock)
    }

    fn build(timeout: Duration, lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            timeout,
            lifetime: chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    /// Per-request timeout of pooled clients.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Borrow a client, reusing an idle one when it is still young enough.
    pub fn get(&self) -> Result<PooledClient<'_>, CrowdgateError> {
        let now = self.clock.now_utc();

        let reused = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.retain(|entry| !self.is_expired(entry, now));
            idle.pop()
        };

        let entry = match reused {
            Some(entry) => entry,
            None => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "creating pooled http client");
                PooledEntry {
                    client: self.new_client()?,
                    created_at: now,
                }
            }
        };

        Ok(PooledClient {
            pool: self,
            entry: Some(entry),
        })
    }

    /// Number of idle clients waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, entry: PooledEntry) {
        if self.is_expired(&entry, self.clock.now_utc()) {
            debug!("recycling expired pooled http client");
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn is_expired(&self, entry: &PooledEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.lifetime
    }

    fn new_client(&self) -> Result<Client, CrowdgateError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CrowdgateError::ConfigError(format!("Failed to build HTTP client: {}", e)))
    }
}
