//! Top-level error type.

use crate::config::ConfigError;
use crate::server::ServerError;
use crate::source::SourceError;

/// Errors that stop the process.
#[derive(thiserror::Error, Debug)]
pub enum TukuError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// A pipeline task panicked or was aborted.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
