//! Pairlink Core - Shared types and the messaging conduit contract
//!
//! This crate provides the configuration, timing policies, error type and the
//! `Conduit` traits shared by the orchestrator, the bridge adapter and the server.

pub mod conduit;
pub mod config;
pub mod error;
pub mod policy;
pub mod protocol;

pub use conduit::{Conduit, ConduitConnector, ConduitSession, ConnectConfig};
pub use config::{Config, ConduitOptions, LinkButton, MessageTemplate};
pub use error::{Error, Result};
pub use policy::{RetryPolicy, SessionPolicy};
pub use protocol::{
    Button, ConduitEvent, ConnectionState, ConnectionUpdate, Disconnect, InteractiveMessage,
    LOGGED_OUT_STATUS,
};
