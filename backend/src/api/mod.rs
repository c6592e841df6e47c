//! HTTP API module.
//!
//! This module provides the HTTP server, wire envelope types and the log
//! broadcaster shared by the whole engine.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
