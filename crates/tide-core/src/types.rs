//! Shared vocabulary types for Tidewater nodes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A totally ordered timestamp issued by the timestamp authority.
///
/// Values produced by [`crate::HybridClock`] pack wall-clock milliseconds
/// and a logical counter; consumers only rely on ordering.
pub type Timestamp = u64;

/// Name of a physical message-bus channel (a "pchan").
pub type ChannelName = String;

/// Identity of a worker node registered with a coordinator.
pub type NodeId = i64;

pub type CollectionId = i64;
pub type PartitionId = i64;
pub type SegmentId = i64;

/// Range of in-flight message timestamps buffered on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Oldest message still in flight.
    pub min_ts: Timestamp,
    /// Newest message still in flight.
    pub max_ts: Timestamp,
}

impl ChannelStats {
    pub fn new(min_ts: Timestamp, max_ts: Timestamp) -> Self {
        Self { min_ts, max_ts }
    }
}

/// Network address of a worker (`ip:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub ip: String,
    pub port: u16,
}

impl Address {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidAddress(s.to_string()))?;
        if ip.is_empty() {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(ip, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_display() {
        let addr: Address = "10.0.0.7:21121".parse().unwrap();
        assert_eq!(addr, Address::new("10.0.0.7", 21121));
        assert_eq!(addr.to_string(), "10.0.0.7:21121");
    }

    #[test]
    fn address_rejects_garbage() {
        assert!("no-port".parse::<Address>().is_err());
        assert!(":8080".parse::<Address>().is_err());
        assert!("host:99999".parse::<Address>().is_err());
    }

    #[test]
    fn channel_stats_field_names() {
        let rendered = toml::to_string(&ChannelStats::new(3, 9)).unwrap();
        assert_eq!(rendered, "min_ts = 3\nmax_ts = 9\n");
    }
}
