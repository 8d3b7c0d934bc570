//! Line source error types.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors that can occur while opening or reading a line source.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The source could not be opened.
    #[error("Cannot open source {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tail process was started without a stdout pipe.
    #[error("Source process has no stdout")]
    NoStdout,

    /// The source process exited with a failure status.
    #[error("Source exited unexpectedly: {0}")]
    Exited(ExitStatus),

    /// Reading from the source failed.
    #[error("Failed to read from source: {0}")]
    Read(#[from] std::io::Error),
}
