//! Channel watermark ticker.
//!
//! Every `interval` the ticker allocates a fresh timestamp, samples channel
//! statistics once, and then, under both map locks, advances each channel:
//!
//! ```text
//!   no pending stats          → watermark = candidate,       candidate = now
//!   stats.min_ts > candidate  → watermark = min(candidate, now),
//!                               candidate = min(now + lookahead, stats.max_ts)
//!   otherwise                 → channel stalled, nothing moves
//! ```
//!
//! Published watermarks never decrease.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tide_core::config::{TickerSection, parse_duration};
use tide_core::{ChannelName, CoreResult, Timestamp, TimestampAllocator, ts_delta};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{TickerError, TickerResult};
use crate::stats::StatisticsSource;

/// Timing parameters for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// How far past `now` a candidate may look when traffic is pending.
    pub lookahead: Duration,
}

impl TickerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            lookahead: interval,
        }
    }

    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn from_section(section: &TickerSection) -> CoreResult<Self> {
        Ok(Self {
            interval: parse_duration(&section.interval)?,
            lookahead: parse_duration(&section.lookahead)?,
        })
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

/// State shared between the ticker handle and its background loop.
struct Shared<S, A> {
    config: TickerConfig,
    stats: S,
    allocator: A,
    /// Last published watermark per channel. Lock before `currents`.
    min_ts_statistics: RwLock<HashMap<ChannelName, Timestamp>>,
    /// Next candidate watermark per channel.
    currents: RwLock<HashMap<ChannelName, Timestamp>>,
}

/// Background loop handle.
struct Runner {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Maintains a monotone low-watermark per channel.
pub struct ChannelsTimeTicker<S, A> {
    shared: Arc<Shared<S, A>>,
    runner: Mutex<Option<Runner>>,
}

impl<S, A> ChannelsTimeTicker<S, A>
where
    S: StatisticsSource,
    A: TimestampAllocator + 'static,
{
    /// Create a stopped ticker tracking `channels`.
    pub fn new(
        config: TickerConfig,
        channels: impl IntoIterator<Item = ChannelName>,
        stats: S,
        allocator: A,
    ) -> Self {
        let initial: HashMap<ChannelName, Timestamp> =
            channels.into_iter().map(|c| (c, 0)).collect();
        Self {
            shared: Arc::new(Shared {
                config,
                stats,
                allocator,
                min_ts_statistics: RwLock::new(initial.clone()),
                currents: RwLock::new(initial),
            }),
            runner: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TickerConfig {
        &self.shared.config
    }

    /// Seed every channel and spawn the periodic loop.
    ///
    /// Watermarks reset to zero and every candidate is set to one freshly
    /// allocated timestamp. Fails if the allocation fails or the loop is
    /// already running.
    pub async fn start(&self) -> TickerResult<()> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            return Err(TickerError::AlreadyStarted);
        }

        let now = self.shared.allocator.alloc_one().await?;
        {
            let mut statistics = self.shared.min_ts_statistics.write().await;
            let mut currents = self.shared.currents.write().await;
            statistics.values_mut().for_each(|ts| *ts = 0);
            currents.values_mut().for_each(|ts| *ts = now);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            shared.run(shutdown_rx).await;
        });
        *runner = Some(Runner {
            handle,
            shutdown_tx,
        });

        info!(
            interval = ?self.shared.config.interval,
            seed = now,
            "channel ticker started"
        );
        Ok(())
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A cycle in progress finishes first, including any allocation backoff.
    /// No state changes after this returns. Calling it on a stopped ticker
    /// does nothing.
    pub async fn close(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown_tx.send(true);
        if let Err(e) = runner.handle.await {
            error!(error = %e, "channel ticker loop panicked");
        }
        info!("channel ticker stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }

    /// Run one cycle now.
    pub async fn tick(&self) -> TickerResult<()> {
        self.shared.tick().await
    }

    pub async fn add_channel(&self, channel: &str) -> TickerResult<()> {
        let mut statistics = self.shared.min_ts_statistics.write().await;
        let mut currents = self.shared.currents.write().await;
        if statistics.contains_key(channel) {
            return Err(TickerError::ChannelExists(channel.to_string()));
        }
        statistics.insert(channel.to_string(), 0);
        currents.insert(channel.to_string(), 0);
        info!(%channel, "channel added to ticker");
        Ok(())
    }

    pub async fn remove_channel(&self, channel: &str) -> TickerResult<()> {
        let mut statistics = self.shared.min_ts_statistics.write().await;
        let mut currents = self.shared.currents.write().await;
        if statistics.remove(channel).is_none() {
            return Err(TickerError::ChannelNotFound(channel.to_string()));
        }
        currents.remove(channel);
        info!(%channel, "channel removed from ticker");
        Ok(())
    }

    /// Last published watermark of a channel. Zero until a cycle has run.
    pub async fn get_last_tick(&self, channel: &str) -> TickerResult<Timestamp> {
        self.shared
            .min_ts_statistics
            .read()
            .await
            .get(channel)
            .copied()
            .ok_or_else(|| TickerError::ChannelNotFound(channel.to_string()))
    }

    /// Watermarks of every initialized channel.
    pub async fn get_all_watermarks(&self) -> HashMap<ChannelName, Timestamp> {
        self.shared
            .min_ts_statistics
            .read()
            .await
            .iter()
            .filter(|(_, ts)| **ts > 0)
            .map(|(channel, ts)| (channel.clone(), *ts))
            .collect()
    }

    /// Candidate the next cycle may publish.
    pub async fn candidate(&self, channel: &str) -> TickerResult<Timestamp> {
        self.shared
            .currents
            .read()
            .await
            .get(channel)
            .copied()
            .ok_or_else(|| TickerError::ChannelNotFound(channel.to_string()))
    }

    /// Tracked channels in name order.
    pub async fn channels(&self) -> Vec<ChannelName> {
        let mut channels: Vec<_> = self
            .shared
            .min_ts_statistics
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        channels.sort();
        channels
    }
}

impl<S, A> Shared<S, A>
where
    S: StatisticsSource,
    A: TimestampAllocator + 'static,
{
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        debug!("channel ticker loop starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    // Failures are logged inside `tick`; the next cycle retries.
                    let _ = self.tick().await;
                }
                _ = shutdown.changed() => {
                    debug!("channel ticker loop shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> TickerResult<()> {
        let now = match self.allocator.alloc_one().await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "timestamp allocation failed, skipping tick");
                return Err(e.into());
            }
        };

        let stats = match self.stats.query() {
            Ok(stats) => stats,
            Err(e) => {
                debug!(error = %e, "channel statistics unavailable, skipping tick");
                return Err(e);
            }
        };

        let lookahead = ts_delta(self.config.lookahead);
        let mut statistics = self.min_ts_statistics.write().await;
        let mut currents = self.currents.write().await;

        for (channel, current) in currents.iter_mut() {
            let published = statistics.entry(channel.clone()).or_insert(0);
            match stats.get(channel) {
                None => {
                    *published = (*published).max(*current);
                    *current = now;
                }
                Some(s) if s.min_ts > *current => {
                    *published = (*published).max((*current).min(now));
                    *current = now.saturating_add(lookahead).min(s.max_ts);
                }
                Some(s) => {
                    debug!(
                        %channel,
                        min_ts = s.min_ts,
                        candidate = *current,
                        "channel stalled"
                    );
                }
            }
        }
        Ok(())
    }
}
