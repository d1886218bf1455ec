//! Wall-clock helpers.
//!
//! Nothing inside the core calls a platform clock directly during its hot
//! path: `now()` is threaded in by the caller via the `Transport` callback
//! set. These free functions exist for the handful of places (CLI tools,
//! tests, token expiry stamping) that need a concrete clock reading outside
//! of that callback plumbing.

use std::time::SystemTime;

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}
