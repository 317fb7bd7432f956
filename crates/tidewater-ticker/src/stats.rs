//! Per-channel statistics sources.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tide_core::{ChannelName, ChannelStats, Timestamp};

use crate::error::TickerResult;

/// Supplies the range of in-flight timestamps per channel.
///
/// Called once per ticker cycle, before any ticker lock is taken. A channel
/// missing from the returned map has no pending traffic.
pub trait StatisticsSource: Send + Sync + 'static {
    fn query(&self) -> TickerResult<HashMap<ChannelName, ChannelStats>>;
}

impl<F> StatisticsSource for F
where
    F: Fn() -> TickerResult<HashMap<ChannelName, ChannelStats>> + Send + Sync + 'static,
{
    fn query(&self) -> TickerResult<HashMap<ChannelName, ChannelStats>> {
        self()
    }
}

/// Tracks messages that were produced but not yet consumed.
///
/// Producers call [`begin`](Self::begin) when a message with timestamp `ts`
/// enters a channel and [`finish`](Self::finish) once it is flushed. The
/// tracker reports `{min_ts, max_ts}` over the pending set. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    /// channel -> pending timestamp -> count of messages at that timestamp.
    pending: Arc<Mutex<HashMap<ChannelName, BTreeMap<Timestamp, usize>>>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelName, BTreeMap<Timestamp, usize>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one in-flight message.
    pub fn begin(&self, channel: &str, ts: Timestamp) {
        let mut pending = self.lock();
        *pending
            .entry(channel.to_string())
            .or_default()
            .entry(ts)
            .or_insert(0) += 1;
    }

    /// Mark one message at `ts` as flushed.
    ///
    /// Returns `false` if no such message was pending.
    pub fn finish(&self, channel: &str, ts: Timestamp) -> bool {
        let mut pending = self.lock();
        let Some(by_ts) = pending.get_mut(channel) else {
            return false;
        };
        let Some(count) = by_ts.get_mut(&ts) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            by_ts.remove(&ts);
        }
        if by_ts.is_empty() {
            pending.remove(channel);
        }
        true
    }

    /// Number of pending messages on a channel.
    pub fn pending(&self, channel: &str) -> usize {
        self.lock()
            .get(channel)
            .map(|by_ts| by_ts.values().sum())
            .unwrap_or(0)
    }

    /// Current `{min_ts, max_ts}` of every channel with pending messages.
    pub fn snapshot(&self) -> HashMap<ChannelName, ChannelStats> {
        self.lock()
            .iter()
            .filter_map(|(channel, by_ts)| {
                let (&min_ts, _) = by_ts.first_key_value()?;
                let (&max_ts, _) = by_ts.last_key_value()?;
                Some((channel.clone(), ChannelStats::new(min_ts, max_ts)))
            })
            .collect()
    }
}

impl StatisticsSource for InFlightTracker {
    fn query(&self) -> TickerResult<HashMap<ChannelName, ChannelStats>> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TickerError;

    #[test]
    fn reports_min_and_max_of_pending() {
        let tracker = InFlightTracker::new();
        tracker.begin("dml_0", 300);
        tracker.begin("dml_0", 100);
        tracker.begin("dml_0", 200);
        tracker.begin("dml_1", 50);

        let stats = tracker.query().unwrap();
        assert_eq!(stats["dml_0"], ChannelStats::new(100, 300));
        assert_eq!(stats["dml_1"], ChannelStats::new(50, 50));
    }

    #[test]
    fn finished_channels_drop_out() {
        let tracker = InFlightTracker::new();
        tracker.begin("dml_0", 100);
        tracker.begin("dml_0", 100);
        assert_eq!(tracker.pending("dml_0"), 2);

        assert!(tracker.finish("dml_0", 100));
        assert_eq!(tracker.snapshot()["dml_0"], ChannelStats::new(100, 100));

        assert!(tracker.finish("dml_0", 100));
        assert!(tracker.snapshot().is_empty());
        assert_eq!(tracker.pending("dml_0"), 0);
    }

    #[test]
    fn finish_unknown_is_false() {
        let tracker = InFlightTracker::new();
        assert!(!tracker.finish("dml_0", 1));
        tracker.begin("dml_0", 5);
        assert!(!tracker.finish("dml_0", 6));
        assert_eq!(tracker.pending("dml_0"), 1);
    }

    #[test]
    fn clones_share_state() {
        let producer = InFlightTracker::new();
        let ticker_side = producer.clone();
        producer.begin("dml_0", 7);
        assert_eq!(ticker_side.pending("dml_0"), 1);
    }

    #[test]
    fn closures_are_sources() {
        let failing = || -> TickerResult<HashMap<ChannelName, ChannelStats>> {
            Err(TickerError::Statistics("proxy unreachable".into()))
        };
        assert!(matches!(failing.query(), Err(TickerError::Statistics(_))));
    }
}
