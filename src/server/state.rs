use std::sync::Arc;

use crate::{session::SessionController, settings::SettingsStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionController,
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(sessions: SessionController, settings: Arc<SettingsStore>) -> Self {
        Self { sessions, settings }
    }
}
