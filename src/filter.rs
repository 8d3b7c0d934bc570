//! Case-insensitive line filter.
//!
//! The pattern is compiled once when the filter is built and reused for
//! every line afterwards.

use regex::{Regex, RegexBuilder};

/// Errors that can occur when building a filter.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// The pattern is not a valid regular expression.
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Decides whether a line is interesting.
///
/// An empty pattern matches every line.
#[derive(Debug, Clone)]
pub struct LineFilter {
    pattern: String,
    regex: Option<Regex>,
}

impl LineFilter {
    /// Compile a filter from a pattern.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidPattern` if the pattern is not a valid
    /// regular expression.
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        let regex = if pattern.is_empty() {
            None
        } else {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| FilterError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            Some(compiled)
        };

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// A filter that lets every line through.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            pattern: String::new(),
            regex: None,
        }
    }

    /// The pattern this filter was built from.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether this filter lets every line through.
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.regex.is_none()
    }

    /// Check a line against the pattern.
    #[must_use]
    pub fn is_interesting(&self, line: &str) -> bool {
        self.regex.as_ref().map_or(true, |re| re.is_match(line))
    }
}

impl Default for LineFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

/// One-shot form of [`LineFilter::is_interesting`].
///
/// Compiles `pattern` on every call; the pump holds a prebuilt
/// [`LineFilter`] instead. An invalid pattern matches nothing.
#[must_use]
pub fn interesting(line: &str, pattern: &str) -> bool {
    LineFilter::new(pattern).is_ok_and(|filter| filter.is_interesting(line))
}
