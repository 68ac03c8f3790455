//! The messaging conduit contract
//!
//! The conduit owns the messaging protocol (handshake, encryption, framing).
//! Pairlink only drives it through these traits: one [`ConduitConnector`]
//! opens connections, each yielding a [`Conduit`] handle and an event stream.

use crate::config::ConduitOptions;
use crate::error::Result;
use crate::protocol::{ConduitEvent, InteractiveMessage};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Parameters for opening one conduit connection
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Directory holding the auth state for this session
    pub auth_dir: PathBuf,
    /// Conduit construction options
    pub options: ConduitOptions,
}

/// An open connection plus the events it emits
pub struct ConduitSession {
    pub conduit: Box<dyn Conduit>,
    pub events: mpsc::Receiver<ConduitEvent>,
}

/// Handle to one open conduit connection
#[async_trait]
pub trait Conduit: Send + Sync {
    /// Whether the auth state is already linked to an account
    async fn is_registered(&self) -> Result<bool>;

    /// Request a pairing code for `number`, seeded with `communion_code`
    async fn request_pairing_code(&self, number: &str, communion_code: &str) -> Result<String>;

    /// Persist the current auth material into the auth directory
    async fn save_credentials(&self) -> Result<()>;

    /// Identifier of the linked account, once known
    async fn self_id(&self) -> Result<Option<String>>;

    /// Send an interactive message to `recipient`
    async fn send_interactive_message(
        &self,
        recipient: &str,
        message: &InteractiveMessage,
    ) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Opens conduit connections
#[async_trait]
pub trait ConduitConnector: Send + Sync {
    async fn connect(&self, config: ConnectConfig) -> Result<ConduitSession>;
}
