//! Startup sequence and task wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::HistoryCache;
use crate::config::TukuConfig;
use crate::error::TukuError;
use crate::pump::{BroadcastPump, PumpSummary};
use crate::registry::SubscriberRegistry;
use crate::server::{AppState, ServerError, StreamInfo, StreamServer};
use crate::source::{pop, LineSource, SourceError, TailSource};

/// A started pipeline: source attached, listener bound, tasks running.
pub struct Running {
    local_addr: SocketAddr,
    info: Arc<StreamInfo>,
    cancel: CancellationToken,
    pump: JoinHandle<Result<PumpSummary, SourceError>>,
    server: JoinHandle<Result<(), ServerError>>,
}

/// Validate `config`, attach to the file and bind the listener, then
/// start the pump and the server.
///
/// Everything that can fail at startup fails here, before anything is
/// served.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the file cannot be
/// followed, or the listener cannot bind.
pub async fn start(config: &TukuConfig, cancel: CancellationToken) -> Result<Running, TukuError> {
    let path = config.source_path()?.to_path_buf();
    let replay = config.tail_lines;
    start_with(config, cancel, TailSource::open(path, replay)).await
}

/// Like [`start`], but with a caller-provided source.
///
/// # Errors
///
/// Returns an error if the filter is invalid, `open` fails, or the
/// listener cannot bind.
pub async fn start_with<S, F>(
    config: &TukuConfig,
    cancel: CancellationToken,
    open: F,
) -> Result<Running, TukuError>
where
    S: LineSource + 'static,
    F: std::future::Future<Output = Result<S, SourceError>>,
{
    let filter = config.line_filter()?;
    let tag = config
        .file
        .as_deref()
        .map(|p| pop(&p.to_string_lossy(), "/").to_string())
        .unwrap_or_default();

    let cache = Arc::new(HistoryCache::new(config.items));
    let registry = Arc::new(SubscriberRegistry::new());
    let info = Arc::new(StreamInfo::new(tag.clone(), filter.pattern()));

    let mut pump = BroadcastPump::new(tag, filter, Arc::clone(&cache), Arc::clone(&registry))
        .with_cancel(cancel.clone());
    let source = pump.attach(open).await?;

    let state = AppState {
        cache,
        registry,
        pump_state: pump.subscribe_state(),
        session: config.session_config(),
        cancel: cancel.clone(),
        info: Arc::clone(&info),
    };

    let bound = match StreamServer::new(state)
        .with_config(config.server_config())
        .bind()
        .await
    {
        Ok(bound) => bound,
        Err(e) => {
            // Dropping the source stops the tail process.
            drop(source);
            return Err(e.into());
        }
    };
    let local_addr = bound.local_addr();

    let pump = tokio::spawn(async move { pump.run(source).await });
    let server = tokio::spawn(bound.serve());

    Ok(Running {
        local_addr,
        info,
        cancel,
        pump,
        server,
    })
}

impl Running {
    /// The address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Run until shutdown or a fatal error.
    ///
    /// A source that ends cleanly stops the pump but the server keeps
    /// serving the backfill until shutdown. A source failure cancels
    /// everything and is returned.
    ///
    /// # Errors
    ///
    /// Returns the source or server error that ended the process.
    pub async fn wait(self) -> Result<(), TukuError> {
        let Self {
            cancel,
            mut pump,
            mut server,
            ..
        } = self;

        let mut pump_done = false;
        let result = loop {
            tokio::select! {
                joined = &mut pump, if !pump_done => {
                    pump_done = true;
                    match joined {
                        Ok(Ok(summary)) => {
                            tracing::info!(
                                lines_seen = summary.lines_seen,
                                lines_matched = summary.lines_matched,
                                "Source finished, still serving backfill"
                            );
                        }
                        Ok(Err(e)) => break Err(TukuError::from(e)),
                        Err(e) => break Err(TukuError::from(e)),
                    }
                }
                joined = &mut server => {
                    break match joined {
                        Ok(result) => result.map_err(TukuError::from),
                        Err(e) => Err(TukuError::from(e)),
                    };
                }
            }
        };

        cancel.cancel();
        if !pump_done {
            if let Ok(Err(e)) = pump.await {
                tracing::debug!(error = %e, "Pump error after shutdown");
            }
        }
        if !server.is_finished() {
            let _ = server.await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_requires_file() {
        let result = start(&TukuConfig::default(), CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(TukuError::Config(crate::config::ConfigError::MissingFile))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_missing_source() {
        let config = TukuConfig {
            file: Some("/tmp/nonexistent-tuku-app-12345.log".into()),
            ..TukuConfig::default()
        };
        let result = start(&config, CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(TukuError::Source(SourceError::Unavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_filter() {
        let config = TukuConfig {
            file: Some("/tmp/whatever.log".into()),
            filter: "(".to_string(),
            ..TukuConfig::default()
        };
        let result = start(&config, CancellationToken::new()).await;
        assert!(matches!(result, Err(TukuError::Config(_))));
    }
}
