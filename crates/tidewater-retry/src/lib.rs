//! tidewater-retry: bounded retry with exponential backoff.
//!
//! Wraps outbound calls (timestamp allocation, worker connections) so
//! that transient unavailability during cluster bring-up or reconnection
//! is not fatal to the caller.
//!
//! ```text
//! attempt 1 ──fail──> sleep(initial)
//! attempt 2 ──fail──> sleep(min(2 × initial, max))
//! attempt 3 ──fail──> sleep(min(4 × initial, max))
//! ...
//! attempt N ──fail──> return last error
//! ```
//!
//! An operation can short-circuit the loop by failing with
//! [`RetryError::Permanent`] (see [`no_retry`]); the wrapped error is
//! returned at once without consuming further attempts.
//!
//! Backoff sleeps are not cancellable. A caller that shuts down while a
//! retry is sleeping waits for the sleep to finish.

pub mod backoff;
pub mod error;

pub use backoff::{Backoff, RetryPolicy, retry};
pub use error::{RetryError, no_retry};
