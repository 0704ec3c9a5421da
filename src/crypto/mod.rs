//! Signature primitives for visitor validation.

pub mod digest;
pub mod freshness;
pub mod signature;
