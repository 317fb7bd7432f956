use thiserror::Error;

use tide_core::{Address, NodeId};

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker not found: {0}")]
    NodeNotFound(NodeId),

    #[error("worker already registered: {0}")]
    AlreadyRegistered(NodeId),

    #[error("address already registered: {0}")]
    AddressInUse(Address),

    #[error("no workers available")]
    NoWorkersAvailable,

    #[error("invalid worker address: {0:?}")]
    InvalidAddress(String),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
}
