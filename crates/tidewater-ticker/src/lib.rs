//! tidewater-ticker: per-channel "safe to read" watermarks.
//!
//! The ticker turns per-channel producer state into a conservative low
//! watermark that advances independently on each channel.
//!
//! ```text
//! ┌────────────────────┐  alloc_one()  ┌──────────────────────┐
//! │ TimestampAllocator │◄──────────────│                      │──► get_last_tick()
//! └────────────────────┘               │  ChannelsTimeTicker  │
//! ┌────────────────────┐    query()    │  (every interval)    │──► get_all_watermarks()
//! │ StatisticsSource   │◄──────────────│                      │
//! └────────────────────┘               └──────────────────────┘
//! ```
//!
//! [`RetryingAllocator`] wraps a remote authority so that transient
//! allocation failures are retried with backoff before a cycle is skipped.
//! [`InFlightTracker`] is the in-process statistics source fed by producers.

pub mod allocator;
pub mod error;
pub mod stats;
pub mod ticker;

pub use allocator::RetryingAllocator;
pub use error::{TickerError, TickerResult};
pub use stats::{InFlightTracker, StatisticsSource};
pub use ticker::{ChannelsTimeTicker, TickerConfig};
