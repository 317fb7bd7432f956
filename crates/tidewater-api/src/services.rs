//! Subsystem assembly and lifecycle.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use tide_core::{HybridClock, NodeConfig};
use tidewater_dispatch::{JobDispatcher, WorkerConnector};
use tidewater_retry::RetryPolicy;
use tidewater_tasks::{QueueConfig, TaskQueue};
use tidewater_ticker::{ChannelsTimeTicker, InFlightTracker, RetryingAllocator, TickerConfig};

use crate::ApiState;

/// Lifecycle state reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Built but not started.
    Initializing,
    Healthy,
    /// The task queue has been closed.
    Stopping,
}

impl ApiState {
    /// Build every subsystem from configuration. Nothing runs until
    /// [`start`](Self::start).
    pub fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let policy = RetryPolicy::from_section(&config.retry)?;
        let ticker_config = TickerConfig::from_section(&config.ticker)?;
        let queue_config = QueueConfig::from_section(&config.tasks)?;

        let tracker = InFlightTracker::new();
        let ticker = ChannelsTimeTicker::new(
            ticker_config,
            config.ticker.channels.iter().cloned(),
            tracker.clone(),
            RetryingAllocator::new(HybridClock::new(), policy),
        );

        Ok(Self {
            node_id: config.node.node_id,
            ticker: Arc::new(ticker),
            tracker,
            tasks: Arc::new(TaskQueue::new(queue_config)),
            dispatcher: Arc::new(JobDispatcher::new()),
            connector: WorkerConnector::new(policy),
        })
    }

    /// Start the task executor and the ticker loop.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.tasks.start().await;
        self.ticker.start().await?;
        info!(node_id = self.node_id, "node services started");
        Ok(())
    }

    pub async fn component_state(&self) -> ComponentState {
        if self.tasks.is_closed() {
            ComponentState::Stopping
        } else if self.ticker.is_running().await {
            ComponentState::Healthy
        } else {
            ComponentState::Initializing
        }
    }

    /// Drain the task queue, then stop the ticker.
    pub async fn shutdown(&self) {
        self.tasks.close().await;
        self.ticker.close().await;
        info!(node_id = self.node_id, "node services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_from_default_config() {
        let mut config = NodeConfig::default();
        config.ticker.channels = vec!["by-dev-dml_0".into()];
        config.ticker.interval = "10ms".into();

        let state = ApiState::from_config(&config).unwrap();
        assert_eq!(state.ticker.channels().await, vec!["by-dev-dml_0".to_string()]);
        assert_eq!(state.component_state().await, ComponentState::Initializing);

        state.start().await.unwrap();
        assert!(state.ticker.is_running().await);
        assert_eq!(state.component_state().await, ComponentState::Healthy);

        state.shutdown().await;
        assert!(!state.ticker.is_running().await);
        assert!(state.tasks.is_closed());
        assert_eq!(state.component_state().await, ComponentState::Stopping);
    }
}
