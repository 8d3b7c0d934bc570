//! HTTP handlers and shared application state.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::HistoryCache;
use crate::pump::PumpState;
use crate::registry::SubscriberRegistry;
use crate::session::SessionConfig;

/// Static description of what is being streamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Short tag of the source, usually the file name.
    pub source: String,
    /// Filter pattern; empty means every line.
    pub pattern: String,
    /// When the process started streaming.
    pub started_at: DateTime<Utc>,
}

impl StreamInfo {
    #[must_use]
    pub fn new(source: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pattern: pattern.into(),
            started_at: Utc::now(),
        }
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<HistoryCache>,
    pub registry: Arc<SubscriberRegistry>,
    /// Latest pump state.
    pub pump_state: watch::Receiver<PumpState>,
    /// Settings applied to every new session.
    pub session: SessionConfig,
    /// Cancelled on shutdown; sessions use child tokens.
    pub cancel: CancellationToken,
    pub info: Arc<StreamInfo>,
}

/// Response for GET /api/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub info: StreamInfo,
    pub pump_state: PumpState,
    /// Connected subscribers.
    pub subscribers: usize,
    /// Lines currently held for backfill.
    pub cached: usize,
    pub capacity: usize,
}

/// GET /api/status - Current pipeline status.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let pump_state = *state.pump_state.borrow();

    Json(StatusResponse {
        info: (*state.info).clone(),
        pump_state,
        subscribers: state.registry.len(),
        cached: state.cache.len(),
        capacity: state.cache.capacity(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;

    #[tokio::test]
    async fn test_get_status_reports_pipeline() {
        let cache = Arc::new(HistoryCache::new(3));
        cache.record(Line::from("ERROR a"));
        let (_state_tx, pump_state) = watch::channel(PumpState::Running);

        let state = AppState {
            cache,
            registry: Arc::new(SubscriberRegistry::new()),
            pump_state,
            session: SessionConfig::default(),
            cancel: CancellationToken::new(),
            info: Arc::new(StreamInfo::new("app.log", "error")),
        };

        let Json(status) = get_status(State(state)).await;
        assert_eq!(status.info.source, "app.log");
        assert_eq!(status.info.pattern, "error");
        assert_eq!(status.pump_state, PumpState::Running);
        assert_eq!(status.subscribers, 0);
        assert_eq!(status.cached, 1);
        assert_eq!(status.capacity, 3);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["source"], "app.log");
        assert_eq!(json["pump_state"], "running");
    }
}
