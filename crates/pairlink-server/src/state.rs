//! Shared application state

use pairlink_core::Config;
use pairlink_session::PairingOrchestrator;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared by every request handler
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Runs one pairing session per request
    pub orchestrator: Arc<PairingOrchestrator>,
    /// Server start time, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, orchestrator: Arc<PairingOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
