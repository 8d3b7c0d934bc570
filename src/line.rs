//! The unit of data flowing through the pipeline.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// One line of text read from the source.
///
/// Backed by an `Arc<str>` so fanning a line out to many subscribers and
/// keeping it in the history cache never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(Arc<str>);

impl Line {
    /// Create a line from any string-like value.
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Borrow the line content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Line {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Line {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Line {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
