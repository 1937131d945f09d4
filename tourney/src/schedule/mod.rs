//! Clock capability and the tournament time policy.
//!
//! Every component that needs "now" receives a [`Clock`] instead of reading the
//! wall clock, so tests can pin an instant.

pub mod clock;
pub mod policy;

pub use clock::{Clock, FixedClock, SystemClock};
pub use policy::{
    CHECK_IN_WINDOW, LOCK_OFFSET, compute_check_in_opens_at, compute_lock_at, is_check_in_open,
    is_lock_due,
};
