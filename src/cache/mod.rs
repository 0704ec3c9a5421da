//! In-memory caching of queue API responses.

pub mod rooms;
