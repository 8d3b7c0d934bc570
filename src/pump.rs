//! Broadcast pump: drains the line source into the cache and subscribers.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::HistoryCache;
use crate::filter::LineFilter;
use crate::line::Line;
use crate::registry::SubscriberRegistry;
use crate::source::{LineSource, SourceError};

/// Lifecycle of the pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    #[default]
    Starting,
    Running,
    Stopped,
    Failed,
}

impl PumpState {
    /// Whether the pump has finished, cleanly or not.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Counters reported when the pump stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Lines read from the source.
    pub lines_seen: u64,
    /// Lines that passed the filter.
    pub lines_matched: u64,
}

/// Single consumer of the line source.
///
/// Every line is logged under the source tag. Lines passing the filter are
/// recorded in the history cache and queued for every subscriber, in the
/// order they were read.
#[derive(Debug)]
pub struct BroadcastPump {
    tag: String,
    filter: LineFilter,
    cache: Arc<HistoryCache>,
    registry: Arc<SubscriberRegistry>,
    state_tx: watch::Sender<PumpState>,
    cancel: CancellationToken,
    summary: PumpSummary,
}

impl BroadcastPump {
    #[must_use]
    pub fn new(
        tag: impl Into<String>,
        filter: LineFilter,
        cache: Arc<HistoryCache>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PumpState::Starting);
        Self {
            tag: tag.into(),
            filter,
            cache,
            registry,
            state_tx,
            cancel: CancellationToken::new(),
            summary: PumpSummary::default(),
        }
    }

    /// Stop the pump when `cancel` fires (builder pattern).
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PumpState {
        *self.state_tx.borrow()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PumpState> {
        self.state_tx.subscribe()
    }

    /// Counters so far.
    #[must_use]
    pub fn summary(&self) -> PumpSummary {
        self.summary
    }

    fn transition(&self, new_state: PumpState) {
        let old_state = self.state_tx.send_replace(new_state);
        tracing::debug!(from = ?old_state, to = ?new_state, "Pump state transition");
    }

    /// Open the source. A failure moves the pump to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `open`.
    pub async fn attach<S, F>(&self, open: F) -> Result<S, SourceError>
    where
        S: LineSource,
        F: Future<Output = Result<S, SourceError>>,
    {
        match open.await {
            Ok(source) => Ok(source),
            Err(e) => {
                tracing::error!(source = %self.tag, error = %e, "Failed to attach to source");
                self.transition(PumpState::Failed);
                Err(e)
            }
        }
    }

    /// Handle one line from the source. Returns whether it matched.
    pub fn process(&mut self, line: Line) -> bool {
        self.summary.lines_seen += 1;
        let matched = self.filter.is_interesting(&line);

        tracing::info!(source = %self.tag, matched, "{line}");

        if matched {
            self.summary.lines_matched += 1;
            let report = self
                .cache
                .record_and(line, |line| self.registry.broadcast(line));
            tracing::trace!(
                delivered = report.delivered,
                failed = report.failed(),
                "Line broadcast"
            );
        }

        matched
    }

    /// Drain `source` until it ends, fails, or the pump is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the source error that stopped the pump. The pump is then in
    /// the `Failed` state.
    pub async fn run<S: LineSource>(&mut self, mut source: S) -> Result<PumpSummary, SourceError> {
        self.transition(PumpState::Running);
        tracing::info!(source = %self.tag, pattern = %self.filter.pattern(), "Broadcast pump running");

        let result = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::info!("Broadcast pump cancelled");
                    break Ok(());
                }

                next = source.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            self.process(line);
                        }
                        Ok(None) => {
                            tracing::info!(source = %self.tag, "Source reached end of stream");
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        source.close().await;

        match result {
            Ok(()) => {
                self.transition(PumpState::Stopped);
                tracing::info!(
                    lines_seen = self.summary.lines_seen,
                    lines_matched = self.summary.lines_matched,
                    "Broadcast pump stopped"
                );
                Ok(self.summary)
            }
            Err(e) => {
                self.transition(PumpState::Failed);
                tracing::error!(source = %self.tag, error = %e, "Broadcast pump failed");
                Err(e)
            }
        }
    }
}
