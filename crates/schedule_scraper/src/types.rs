/// Shared state handed to the read API
use crate::db::SwitchController;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct AppState {
    /// Resolves the live store for every read
    pub switch: Arc<SwitchController>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(switch: Arc<SwitchController>) -> Self {
        Self {
            switch,
            started_at: Utc::now(),
        }
    }
}
