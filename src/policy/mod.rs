//! Which requests are subject to admission control.

pub mod exclusion;
pub mod failure;
pub mod rooms;
