pub mod config;
pub mod error;
pub mod tso;
pub mod types;

pub use config::{NodeConfig, parse_duration};
pub use error::{CoreError, CoreResult};
pub use tso::{HybridClock, LOGICAL_BITS, TimestampAllocator, compose_ts, parse_ts, ts_delta};
pub use types::*;
