//! Per-connection subscriber lifecycle.
//!
//! A session registers itself, sends the backfill, then forwards live
//! lines until the connection goes away, and finally deregisters.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::HistoryCache;
use crate::line::Line;
use crate::registry::{
    RegistryError, SendError, SubscriberId, SubscriberRegistry, DEFAULT_SUBSCRIBER_BUFFER,
};

/// Something received from a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A message from the client. Nothing is required of it.
    Data(String),
    /// The connection is closed or broken.
    Disconnected,
}

/// Transport carrying lines to one subscriber.
#[async_trait]
pub trait Connection: Send {
    /// Deliver one line.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the write.
    async fn send(&mut self, line: &Line) -> Result<(), SendError>;

    /// Wait for the next inbound message or disconnect.
    ///
    /// Must be cancel safe: the session drops this future whenever a live
    /// line is ready to send.
    async fn receive(&mut self) -> Inbound;
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Connecting,
    Registered,
    Disconnected,
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lines queued for this subscriber before new ones are dropped.
    pub buffer: usize,
    /// Optional message sent once before the backfill.
    pub greeting: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SUBSCRIBER_BUFFER,
            greeting: None,
        }
    }
}

/// What a finished session delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SubscriberId,
    /// Lines sent from the history cache on join.
    pub backfilled: usize,
    /// Live lines forwarded afterwards.
    pub forwarded: u64,
}

/// One subscriber's connection lifecycle.
#[derive(Debug)]
pub struct SubscriberSession {
    id: SubscriberId,
    cache: Arc<HistoryCache>,
    registry: Arc<SubscriberRegistry>,
    config: SessionConfig,
    cancel: CancellationToken,
    state: SessionState,
}

impl SubscriberSession {
    /// Create a session with a freshly minted ID.
    #[must_use]
    pub fn new(cache: Arc<HistoryCache>, registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cache,
            registry,
            config: SessionConfig::default(),
            cancel: CancellationToken::new(),
            state: SessionState::Connecting,
        }
    }

    /// Use a specific ID instead of a random one.
    #[must_use]
    pub fn with_id(mut self, id: SubscriberId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// End the session when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, new_state: SessionState) {
        tracing::debug!(subscriber = %self.id, from = ?self.state, to = ?new_state, "Session state transition");
        self.state = new_state;
    }

    /// Serve `conn` until it disconnects.
    ///
    /// The backfill snapshot and the registration happen under the cache
    /// lock, so each line reaches this subscriber exactly once: either in
    /// the backfill or live, and never ahead of the backfill.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateId` if the ID is already taken. The
    /// connection is dropped without sending anything.
    pub async fn run<C: Connection>(mut self, mut conn: C) -> Result<SessionSummary, RegistryError> {
        let (tx, mut rx) = mpsc::channel(self.config.buffer.max(1));

        let (backfill, joined) = self
            .cache
            .snapshot_and(|| self.registry.join(self.id, tx));

        let registration = match joined {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!(subscriber = %self.id, error = %e, "Aborting session");
                self.transition(SessionState::Disconnected);
                return Err(e);
            }
        };

        self.transition(SessionState::Registered);
        tracing::info!(
            subscriber = %self.id,
            backfill = backfill.len(),
            total = self.registry.len(),
            "Client connected"
        );

        let mut summary = SessionSummary {
            id: self.id,
            backfilled: 0,
            forwarded: 0,
        };

        if let Err(e) = self.serve(&mut conn, &mut rx, backfill, &mut summary).await {
            tracing::debug!(subscriber = %self.id, error = %e, "Send to subscriber failed");
        }

        drop(registration);
        self.transition(SessionState::Disconnected);
        tracing::info!(
            subscriber = %self.id,
            forwarded = summary.forwarded,
            total = self.registry.len(),
            "Client disconnected"
        );

        Ok(summary)
    }

    async fn serve<C: Connection>(
        &self,
        conn: &mut C,
        rx: &mut mpsc::Receiver<Line>,
        backfill: Vec<Line>,
        summary: &mut SessionSummary,
    ) -> Result<(), SendError> {
        if let Some(greeting) = &self.config.greeting {
            conn.send(&Line::from(greeting.as_str())).await?;
        }

        for line in &backfill {
            conn.send(line).await?;
            summary.backfilled += 1;
        }

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Ok(()),

                // Live lines first so a chatty client cannot starve its own queue.
                line = rx.recv() => match line {
                    Some(line) => {
                        conn.send(&line).await?;
                        summary.forwarded += 1;
                    }
                    None => return Ok(()),
                },

                inbound = conn.receive() => match inbound {
                    Inbound::Data(data) => {
                        tracing::debug!(subscriber = %self.id, bytes = data.len(), "Ignoring client message");
                    }
                    Inbound::Disconnected => return Ok(()),
                },
            }
        }
    }
}
