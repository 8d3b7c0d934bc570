//! tuku - tail a file, filter its lines, and stream matches to WebSocket
//! subscribers with a bounded backfill.

pub mod app;
pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod line;
pub mod pump;
pub mod registry;
pub mod server;
pub mod session;
pub mod source;
