//! Line sources feeding the broadcast pump.

mod error;
mod reader;
mod tail;

use async_trait::async_trait;

pub use error::SourceError;
pub use reader::ReaderSource;
pub use tail::{TailSource, DEFAULT_TAIL_LINES};

use crate::line::Line;

/// An ordered, possibly endless, sequence of lines.
#[async_trait]
pub trait LineSource: Send {
    /// Wait for the next line.
    ///
    /// Returns `Ok(None)` once the source has ended cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the source terminates unexpectedly.
    async fn next_line(&mut self) -> Result<Option<Line>, SourceError>;

    /// Release the source. Called once when the pump stops.
    async fn close(&mut self) {}
}

/// Split `s` on `sep` and return the last piece.
///
/// Used to turn a source path into the short tag shown in logs.
#[must_use]
pub fn pop<'a>(s: &'a str, sep: &str) -> &'a str {
    s.rsplit(sep).next().unwrap_or(s)
}
