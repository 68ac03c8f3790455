//! Event and message types exchanged with the messaging conduit

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Disconnect status code meaning the account logged the link out
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Connection lifecycle state reported by the conduit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
    /// Any state this crate does not act on
    Other(String),
}

impl From<String> for ConnectionState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "connecting" => ConnectionState::Connecting,
            "open" => ConnectionState::Open,
            "close" => ConnectionState::Close,
            _ => ConnectionState::Other(s),
        }
    }
}

impl From<ConnectionState> for String {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting => "connecting".to_string(),
            ConnectionState::Open => "open".to_string(),
            ConnectionState::Close => "close".to_string(),
            ConnectionState::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectOutput {
    status_code: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct DisconnectError {
    #[serde(default)]
    output: DisconnectOutput,
}

/// Reason attached to a `close` connection update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    #[serde(default)]
    error: Option<DisconnectError>,
}

impl Disconnect {
    /// Build a disconnect carrying a status code
    pub fn with_status(status_code: u16) -> Self {
        Self {
            error: Some(DisconnectError {
                output: DisconnectOutput {
                    status_code: Some(status_code),
                },
            }),
        }
    }

    /// Status code of the disconnect, if the conduit reported one
    pub fn status_code(&self) -> Option<u16> {
        self.error.as_ref().and_then(|e| e.output.status_code)
    }

    /// Whether the remote account logged this link out
    pub fn is_logged_out(&self) -> bool {
        self.status_code() == Some(LOGGED_OUT_STATUS)
    }
}

/// Payload of a `connection.update` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionState>,
    #[serde(default)]
    pub last_disconnect: Option<Disconnect>,
}

impl ConnectionUpdate {
    /// An update reporting the connection as open
    pub fn open() -> Self {
        Self {
            connection: Some(ConnectionState::Open),
            last_disconnect: None,
        }
    }

    /// An update reporting the connection as closed
    pub fn closed(disconnect: Option<Disconnect>) -> Self {
        Self {
            connection: Some(ConnectionState::Close),
            last_disconnect: disconnect,
        }
    }
}

/// Events emitted by the conduit for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConduitEvent {
    /// Auth material changed and must be persisted (`creds.update`)
    CredsUpdate,
    /// Connection state changed (`connection.update`)
    ConnectionUpdate(ConnectionUpdate),
}

impl ConduitEvent {
    /// Wire name of a creds event
    pub const CREDS_UPDATE: &'static str = "creds.update";
    /// Wire name of a connection event
    pub const CONNECTION_UPDATE: &'static str = "connection.update";

    /// Decode an event from its wire name and payload
    ///
    /// Returns `Ok(None)` for events this crate does not consume.
    pub fn from_wire(name: &str, data: Value) -> serde_json::Result<Option<Self>> {
        match name {
            Self::CREDS_UPDATE => Ok(Some(ConduitEvent::CredsUpdate)),
            Self::CONNECTION_UPDATE => {
                let update = if data.is_null() {
                    ConnectionUpdate::default()
                } else {
                    serde_json::from_value(data)?
                };
                Ok(Some(ConduitEvent::ConnectionUpdate(update)))
            }
            _ => Ok(None),
        }
    }
}

/// One button of an interactive message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    /// Button kind, e.g. `cta_copy` or `cta_url`
    pub name: String,
    /// Button parameters, JSON-encoded as the conduit expects
    pub button_params_json: String,
}

impl Button {
    /// A button that copies `code` to the clipboard
    pub fn copy(label: &str, code: &str) -> Self {
        Self {
            name: "cta_copy".to_string(),
            button_params_json: serde_json::json!({
                "display_text": label,
                "copy_code": code,
            })
            .to_string(),
        }
    }

    /// A button that opens `url`
    pub fn url(label: &str, url: &str) -> Self {
        Self {
            name: "cta_url".to_string(),
            button_params_json: serde_json::json!({
                "display_text": label,
                "url": url,
            })
            .to_string(),
        }
    }
}

/// A message with action buttons, sent through the conduit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMessage {
    pub title: String,
    pub text: String,
    pub footer: String,
    pub buttons: Vec<Button>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_close_update_parsing() {
        let event = ConduitEvent::from_wire(
            "connection.update",
            json!({
                "connection": "close",
                "lastDisconnect": { "error": { "output": { "statusCode": 401 } } }
            }),
        )
        .unwrap()
        .unwrap();

        match event {
            ConduitEvent::ConnectionUpdate(update) => {
                assert_eq!(update.connection, Some(ConnectionState::Close));
                let disconnect = update.last_disconnect.unwrap();
                assert_eq!(disconnect.status_code(), Some(401));
                assert!(disconnect.is_logged_out());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_without_status() {
        let update: ConnectionUpdate = serde_json::from_value(json!({
            "connection": "close",
            "lastDisconnect": { "error": {} }
        }))
        .unwrap();
        let disconnect = update.last_disconnect.unwrap();
        assert_eq!(disconnect.status_code(), None);
        assert!(!disconnect.is_logged_out());
    }

    #[test]
    fn test_connecting_state() {
        let update: ConnectionUpdate =
            serde_json::from_value(json!({ "connection": "connecting" })).unwrap();
        assert_eq!(update.connection, Some(ConnectionState::Connecting));
    }

    #[test]
    fn test_unknown_connection_state() {
        let update: ConnectionUpdate =
            serde_json::from_value(json!({ "connection": "reconnecting" })).unwrap();
        assert_eq!(
            update.connection,
            Some(ConnectionState::Other("reconnecting".to_string()))
        );
    }

    #[test]
    fn test_unconsumed_event_is_skipped() {
        let event = ConduitEvent::from_wire("messages.upsert", json!({})).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_copy_button_params() {
        let button = Button::copy("Copy", "PAIRLINK~abc");
        let params: Value = serde_json::from_str(&button.button_params_json).unwrap();
        assert_eq!(button.name, "cta_copy");
        assert_eq!(params["copy_code"], "PAIRLINK~abc");
    }
}
