//! Outbound worker connections with retry.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use tide_core::Address;
use tidewater_retry::{RetryError, RetryPolicy, no_retry, retry};

use crate::error::{DispatchError, DispatchResult};

/// Dials workers, retrying refused or slow connections with backoff.
///
/// A malformed address fails on the first attempt.
#[derive(Debug, Clone)]
pub struct WorkerConnector {
    policy: RetryPolicy,
    connect_timeout: Duration,
}

impl Default for WorkerConnector {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl WorkerConnector {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            connect_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub async fn connect(&self, address: &str) -> DispatchResult<TcpStream> {
        retry(&self.policy, move || async move {
            let target: Address = address
                .parse()
                .map_err(|_| no_retry(DispatchError::InvalidAddress(address.to_string())))?;
            let target = target.to_string();

            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&target)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(source)) => Err(RetryError::Transient(DispatchError::Connect {
                    address: target,
                    source,
                })),
                Err(_) => Err(RetryError::Transient(DispatchError::ConnectTimeout(target))),
            }
        })
        .await
    }

    /// Check that a worker accepts connections.
    pub async fn verify(&self, address: &str) -> DispatchResult<()> {
        let stream = self.connect(address).await?;
        debug!(%address, peer = ?stream.peer_addr().ok(), "worker reachable");
        Ok(())
    }
}
