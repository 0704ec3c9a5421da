//! Room matching and checkout detection.
//!
//! Rooms are scanned in configuration order. A room is only considered
//! when its `domain` is literally `https://{host}`, whatever scheme the
//! request itself arrived on.

use crate::protocol::models::{PatternType, RoomConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Compiled room and checkout patterns, keyed by source. Room sets are small
/// and change rarely, so entries are never evicted.
static COMPILED_PATTERNS: Lazy<RwLock<HashMap<String, Result<Regex, regex::Error>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Compile `pattern` once per process.
fn compiled_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(found) = COMPILED_PATTERNS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(pattern)
    {
        return found.clone();
    }

    let compiled = Regex::new(pattern);
    COMPILED_PATTERNS
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(pattern.to_string(), compiled.clone());
    compiled
}

/// Checkout signal carried alongside every admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BustCookie {
    /// The request hit a checkout URL.
    Busted,
    /// Checked, no checkout URL matched.
    NotBusted,
    /// Not evaluated for this decision.
    #[default]
    Absent,
}

fn domain_matches(room: &RoomConfig, host: &str) -> bool {
    room.domain == format!("https://{}", host)
}

fn pattern_matches(room: &RoomConfig, path: &str) -> bool {
    match room.pattern_type {
        PatternType::Regex => match compiled_pattern(&room.url_pattern) {
            Ok(re) => re.is_match(path),
            Err(e) => {
                warn!(slug = %room.slug, error = %e, "invalid room url pattern, skipping room");
                false
            }
        },
        PatternType::Contains => path.contains(&room.url_pattern),
        PatternType::All => true,
        PatternType::Unknown => false,
    }
}

/// First room on `host` whose pattern matches `path` (path plus query).
pub fn match_room<'a>(host: &str, path: &str, rooms: &'a [RoomConfig]) -> Option<&'a RoomConfig> {
    let room = rooms
        .iter()
        .filter(|room| domain_matches(room, host))
        .find(|room| pattern_matches(room, path));

    debug!(host, path, slug = room.map(|r| r.slug.as_str()), "room match");
    room
}

/// Whether `path` on `host` hits any room's checkout pattern.
///
/// Rooms without a checkout pattern, and rooms whose pattern does not
/// compile, are skipped.
pub fn is_checkout_buster(host: &str, path: &str, rooms: &[RoomConfig]) -> BustCookie {
    for room in rooms.iter().filter(|room| domain_matches(room, host)) {
        let Some(pattern) = room.checkout.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };

        let re = match compiled_pattern(pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(slug = %room.slug, error = %e, "invalid checkout pattern, skipping room");
                continue;
            }
        };

        if re.is_match(path) {
            return BustCookie::Busted;
        }
    }

    BustCookie::NotBusted
}
