//! # Crowdgate
//!
//! **Server-side waiting room admission for Rust web services.**
//!
//! Crowdgate decides, for every incoming request, whether the visitor may
//! proceed to the protected site or must be sent to a hosted waiting room.
//! Decisions are backed by a remote queueing service and by signed cookies
//! that let returning visitors through without a network round trip.
//!
//! ## Features
//!
//! - **Room matching** by domain and regex / contains / catch-all URL patterns
//! - **Signed admission** with per-room SHA-256 signature chains
//! - **Session timeout** enforced through an integrity-protected touched time
//! - **Room config caching** with a configurable TTL
//! - **Pooled HTTP clients** with bounded retries on timeout
//! - **Checkout notification** when visitors reach a room's checkout URL
//!
//! ## Quickstart
//!
//! ```no_run
//! use crowdgate::{CrowdgateConfig, GateKeeper, ValidateRequest};
//!
//! fn main() -> Result<(), crowdgate::CrowdgateError> {
//!     let config = CrowdgateConfig::new("your-public-key", "your-private-key");
//!     let gatekeeper = GateKeeper::new(config)?;
//!
//!     let request = ValidateRequest {
//!         url: "https://shop.example/products",
//!         user_agent: "Mozilla/5.0",
//!         language: "en-GB",
//!         ip: "203.0.113.7",
//!         cookie: "",
//!     };
//!     let result = gatekeeper.validate(&request)?;
//!
//!     if let Some(url) = &result.redirect_url {
//!         println!("redirect to {}", url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! - `public_key` - sent to the queue API and the waiting room
//! - `private_key` - signs and verifies admission; never leaves the process
//! - `exclusions` - path regex for requests that bypass admission
//! - `room_cache_ttl` - how long room configuration is reused
//!
//! [`CrowdgateConfig::from_env`] reads the same settings from
//! `CROWDHANDLER_*` environment variables.

#![deny(warnings)]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/crowdgate/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Cookie layer
pub mod cookie;

// Client layer
pub mod client;

// Cache layer
pub mod cache;

// Policy layer
pub mod policy;

// GateKeeper (main public API)
pub mod gatekeeper;

// Re-exports for public API
pub use cache::rooms::{CachedRooms, RoomCache};
pub use client::api::QueueApi;
pub use client::http::ApiClient;
pub use clock::{Clock, SystemClock};
pub use config::CrowdgateConfig;
pub use cookie::format::{CookieState, COOKIE_NAME};
pub use errors::CrowdgateError;
pub use gatekeeper::{Action, GateKeeper, ValidateRequest, ValidateResult};
pub use policy::failure::FailurePolicy;
pub use policy::rooms::BustCookie;
pub use protocol::models::{PatternType, RoomConfig, TokenResponse};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
