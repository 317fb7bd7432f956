use thiserror::Error;

use tide_core::{ChannelName, CoreError};

/// Result type alias for ticker operations.
pub type TickerResult<T> = Result<T, TickerError>;

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("channel already exists: {0}")]
    ChannelExists(ChannelName),

    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelName),

    #[error("statistics query failed: {0}")]
    Statistics(String),

    #[error(transparent)]
    Allocation(#[from] CoreError),

    #[error("ticker already started")]
    AlreadyStarted,
}
