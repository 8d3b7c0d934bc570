//! HTTP server exposing the WebSocket stream and a status endpoint.

mod error;
mod handlers;
mod listener;
mod ws;

pub use error::ServerError;
pub use handlers::{AppState, StatusResponse, StreamInfo};
pub use listener::{BoundServer, ServerConfig, StreamServer, DEFAULT_HOST, DEFAULT_PORT};
pub use ws::WsConnection;
