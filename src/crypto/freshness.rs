//! Room timeout window enforcement.

use crate::clock::{minutes_since, Clock};
use chrono::{DateTime, Utc};

/// Check that `then` is still inside a room's timeout window.
///
/// Elapsed time is counted in whole minutes (truncated), and the window is
/// open-ended on the left: with a 30 minute timeout, 29 elapsed minutes pass
/// and 30 do not.
pub fn within_timeout<C: Clock + ?Sized>(
    then: &DateTime<Utc>,
    timeout_minutes: i64,
    clock: &C,
) -> bool {
    minutes_since(then, &clock.now_utc()) < timeout_minutes
}
