//! Queue API client layer.

pub mod api;
pub mod http;
pub mod pool;
