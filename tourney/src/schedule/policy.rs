//! Lock and check-in times derived from a tournament's start.

use super::clock::Clock;
use chrono::{DateTime, Duration, Utc};

/// Registration locks this long before the start
pub const LOCK_OFFSET: Duration = Duration::minutes(2);

/// Check-in opens this long before the start
pub const CHECK_IN_WINDOW: Duration = Duration::minutes(20);

/// Instant after which registration is closed and the field is finalized
pub fn compute_lock_at(start_date: DateTime<Utc>) -> DateTime<Utc> {
    start_date - LOCK_OFFSET
}

/// Instant from which entrants may check in
pub fn compute_check_in_opens_at(start_date: DateTime<Utc>) -> DateTime<Utc> {
    start_date - CHECK_IN_WINDOW
}

/// Whether check-in is accepted right now: from the window opening until lock.
pub fn is_check_in_open(start_date: DateTime<Utc>, clock: &dyn Clock) -> bool {
    let now = clock.now();
    now >= compute_check_in_opens_at(start_date) && now < compute_lock_at(start_date)
}

/// Whether `lock_at` has been reached
pub fn is_lock_due(lock_at: DateTime<Utc>, clock: &dyn Clock) -> bool {
    lock_at <= clock.now()
}
