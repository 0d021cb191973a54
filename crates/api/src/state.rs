//! Application state shared by all routes

use std::sync::Arc;

use crate::config::Config;
use crate::websocket::ChatState;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: ChatState,
}

impl AppState {
    pub fn new(config: Config, chat: ChatState) -> Self {
        Self {
            config: Arc::new(config),
            chat,
        }
    }
}
