//! Configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::cache::DEFAULT_CAPACITY;
use crate::filter::LineFilter;
use crate::registry::DEFAULT_SUBSCRIBER_BUFFER;
use crate::server::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use crate::session::SessionConfig;
use crate::source::DEFAULT_TAIL_LINES;

/// Ports below this are treated as unset.
const MIN_PORT: u16 = 10;

/// Configuration for the streamer, as loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TukuConfig {
    /// File to follow. Required.
    pub file: Option<PathBuf>,
    /// Case-insensitive pattern; empty streams every line.
    pub filter: String,
    /// Port to listen on; unset or single-digit values use the default.
    pub port: Option<u16>,
    /// Host address to bind to.
    pub host: String,
    /// Number of matching lines kept for backfill.
    pub items: usize,
    /// Lines queued per subscriber before new ones are dropped for it.
    pub subscriber_buffer: usize,
    /// Message sent to each subscriber before the backfill.
    pub greeting: Option<String>,
    /// Existing lines of the file replayed on start.
    pub tail_lines: usize,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for TukuConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: String::new(),
            port: None,
            host: DEFAULT_HOST.to_string(),
            items: DEFAULT_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            greeting: None,
            tail_lines: DEFAULT_TAIL_LINES,
            cors_permissive: true,
        }
    }
}

/// Values given on the command line, overriding the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub file: Option<PathBuf>,
    pub filter: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub items: Option<usize>,
    pub greeting: Option<String>,
    pub tail_lines: Option<usize>,
}

impl TukuConfig {
    /// Apply command-line overrides on top of this configuration.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(file) = overrides.file {
            self.file = Some(file);
        }
        if let Some(filter) = overrides.filter {
            self.filter = filter;
        }
        if let Some(port) = overrides.port {
            self.port = Some(port);
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(items) = overrides.items {
            self.items = items;
        }
        if let Some(greeting) = overrides.greeting {
            self.greeting = Some(greeting);
        }
        if let Some(tail_lines) = overrides.tail_lines {
            self.tail_lines = tail_lines;
        }
        self
    }

    /// The file to follow.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingFile` if no file is configured.
    pub fn source_path(&self) -> Result<&Path, ConfigError> {
        match self.file.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(ConfigError::MissingFile),
        }
    }

    /// Port to bind, falling back to the default when unset or too small.
    #[must_use]
    pub fn resolved_port(&self) -> u16 {
        match self.port {
            Some(port) if port >= MIN_PORT => port,
            _ => DEFAULT_PORT,
        }
    }

    /// Compile the filter pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if the pattern does not compile.
    pub fn line_filter(&self) -> Result<LineFilter, ConfigError> {
        Ok(LineFilter::new(&self.filter)?)
    }

    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.resolved_port(),
            host: self.host.clone(),
            cors_permissive: self.cors_permissive,
        }
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            buffer: self.subscriber_buffer,
            greeting: self.greeting.clone(),
        }
    }
}
