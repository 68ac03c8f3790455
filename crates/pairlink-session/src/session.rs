//! Pairing session state

use crate::session_id::SessionId;
use crate::store::CredentialStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Lifecycle of one pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Connecting,
    CodeRequested,
    LinkOpen,
    AwaitingCredential,
    Packaging,
    Transmitting,
    Closing,
    CleanedUp,
    Reconnecting,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::CleanedUp | SessionState::Failed)
    }
}

/// One pairing attempt, owned by a single orchestrator run
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    number: String,
    created_at: DateTime<Utc>,
    state: SessionState,
    reconnects: u32,
    dir: PathBuf,
    cleaned: bool,
}

impl Session {
    pub fn new(id: SessionId, number: String, dir: PathBuf) -> Self {
        Self {
            id,
            number,
            created_at: Utc::now(),
            state: SessionState::Connecting,
            reconnects: 0,
            dir,
            cleaned: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Requested phone number, as received
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Storage directory of this session
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Move to `next`; terminal states are never left
    pub fn transition(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            debug!("[{}] ignoring {:?} after {:?}", self.id, next, self.state);
            return;
        }
        debug!("[{}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Record a reconnect and enter `Reconnecting`
    pub fn begin_reconnect(&mut self) -> u32 {
        self.reconnects += 1;
        self.transition(SessionState::Reconnecting);
        self.reconnects
    }

    pub fn fail(&mut self) {
        self.transition(SessionState::Failed);
    }

    /// Remove the session directory
    ///
    /// Runs at most once per session; returns whether this call did the work.
    pub async fn cleanup(&mut self, store: &CredentialStore) -> bool {
        if self.cleaned {
            return false;
        }
        self.cleaned = true;

        match store.remove_tree(&self.dir).await {
            Ok(()) => info!("[{}] Session directory removed", self.id),
            Err(e) => error!("[{}] Failed to remove session directory: {}", self.id, e),
        }
        self.transition(SessionState::CleanedUp);
        true
    }
}
