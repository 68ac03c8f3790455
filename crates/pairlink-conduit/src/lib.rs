//! Pairlink Conduit - Process-bridge conduit adapter
//!
//! The messaging protocol lives in an external driver process. This crate
//! spawns one driver per connection and exchanges line-delimited JSON with it
//! over stdio:
//!
//! - requests: `{"id": 1, "method": "requestPairingCode", "params": {...}}`
//! - responses: `{"id": 1, "result": {...}}` or `{"id": 1, "error": {"message": "..."}}`
//! - events: `{"event": "connection.update", "data": {...}}`

pub mod bridge;
pub mod connection;

pub use bridge::{BridgeConduit, BridgeConnector};
pub use connection::BridgeConnection;
