//! Visitor cookie state.

pub mod format;
