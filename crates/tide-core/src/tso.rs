//! Timestamp authority.
//!
//! Timestamps use a hybrid layout: the high bits carry wall-clock
//! milliseconds and the low [`LOGICAL_BITS`] bits carry a logical counter
//! that disambiguates allocations within the same millisecond.
//!
//! ```text
//!  63                          18 17            0
//! ┌──────────────────────────────┬───────────────┐
//! │        physical (ms)         │    logical    │
//! └──────────────────────────────┴───────────────┘
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::CoreResult;
use crate::types::Timestamp;

/// Number of low bits reserved for the logical counter.
pub const LOGICAL_BITS: u32 = 18;

const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Pack a physical millisecond value and a logical counter.
pub fn compose_ts(physical_ms: u64, logical: u64) -> Timestamp {
    (physical_ms << LOGICAL_BITS) | (logical & LOGICAL_MASK)
}

/// Split a timestamp into `(physical_ms, logical)`.
pub fn parse_ts(ts: Timestamp) -> (u64, u64) {
    (ts >> LOGICAL_BITS, ts & LOGICAL_MASK)
}

/// Convert a wall-clock duration into a timestamp delta.
pub fn ts_delta(duration: Duration) -> Timestamp {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    millis.saturating_mul(1 << LOGICAL_BITS)
}

/// Source of globally ordered timestamps.
///
/// Implementations are called from background loops and must tolerate
/// frequent calls. Failures are expected to be transient.
pub trait TimestampAllocator: Send + Sync {
    /// Allocate a single fresh timestamp.
    fn alloc_one(&self) -> impl Future<Output = CoreResult<Timestamp>> + Send;
}

impl<A: TimestampAllocator> TimestampAllocator for Arc<A> {
    fn alloc_one(&self) -> impl Future<Output = CoreResult<Timestamp>> + Send {
        (**self).alloc_one()
    }
}

/// In-process timestamp authority.
///
/// Issues strictly increasing hybrid timestamps. When the wall clock has
/// not moved (or moved backwards) the logical counter is bumped instead;
/// a full counter rolls over into the next millisecond.
#[derive(Debug, Default)]
pub struct HybridClock {
    /// Last issued `(physical_ms, logical)` pair.
    last: Mutex<(u64, u64)>,
}

impl HybridClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next timestamp.
    pub fn next(&self) -> Timestamp {
        let wall = epoch_millis();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut physical, mut logical) = *last;

        if wall > physical {
            physical = wall;
            logical = 0;
        } else {
            logical += 1;
            if logical > LOGICAL_MASK {
                debug!(physical, "logical counter exhausted, advancing physical time");
                physical += 1;
                logical = 0;
            }
        }

        *last = (physical, logical);
        compose_ts(physical, logical)
    }
}

impl TimestampAllocator for HybridClock {
    async fn alloc_one(&self) -> CoreResult<Timestamp> {
        Ok(self.next())
    }
}

fn epoch_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX >> LOGICAL_BITS)
}
