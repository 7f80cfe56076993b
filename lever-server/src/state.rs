//! Shared application state for the lever server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lever_core::Coordinator;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Arm lifecycle coordinator
    pub coordinator: Arc<Coordinator>,
    /// Age after which `POST /sweep` force-resolves a selection
    pub sweep_max_age: chrono::Duration,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, sweep_max_age: chrono::Duration) -> Self {
        Self {
            coordinator,
            sweep_max_age,
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
