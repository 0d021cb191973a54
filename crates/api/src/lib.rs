//! Support chat API library
//!
//! This crate contains the relay server components: the websocket fabric,
//! the completion client and the HTTP routes.

pub mod completion;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
