//! Queue API wire types and request URL handling.

pub mod models;
pub mod query;
