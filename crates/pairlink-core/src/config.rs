//! Configuration types for pairlink

use crate::policy::SessionPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Options handed to the conduit when a connection is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConduitOptions {
    /// Protocol version override; the conduit picks its latest when unset
    pub protocol_version: Option<String>,
    /// Print a QR code to the terminal
    pub print_qr_in_terminal: bool,
    /// Sync the full message history on link
    pub sync_full_history: bool,
    /// Appear online as soon as the connection opens
    pub mark_online_on_connect: bool,
    /// Generate high quality link previews
    pub generate_high_quality_link_preview: bool,
    /// Ignore group chat traffic
    pub ignore_groups: bool,
    /// Connection handshake timeout
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Keepalive ping interval
    #[serde(with = "millis")]
    pub keep_alive_interval: Duration,
    /// Timeout for a single request to the conduit
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Browser identity reported to the remote service
    pub browser: (String, String),
    /// Client identity string
    pub user_agent: String,
    /// Capacity of the per-connection event channel
    pub event_buffer: usize,
}

impl Default for ConduitOptions {
    fn default() -> Self {
        Self {
            protocol_version: None,
            print_qr_in_terminal: false,
            sync_full_history: false,
            mark_online_on_connect: true,
            generate_high_quality_link_preview: true,
            ignore_groups: true,
            connect_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            browser: ("Mac OS".to_string(), "Safari".to_string()),
            user_agent: format!("PAIRLINK/{}", env!("CARGO_PKG_VERSION")),
            event_buffer: 64,
        }
    }
}

/// A link button attached to the credential message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Shape of the interactive message that carries the credential payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Fixed marker placed in front of the encoded credential
    pub payload_prefix: String,
    /// Message title
    pub title: String,
    /// Message footer
    pub footer: String,
    /// Label of the copy button that carries the payload
    pub copy_label: String,
    /// Additional URL buttons
    pub links: Vec<LinkButton>,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            payload_prefix: "PAIRLINK~".to_string(),
            title: String::new(),
            footer: "> *Powered by pairlink*".to_string(),
            copy_label: "Copy Session".to_string(),
            links: vec![LinkButton {
                label: "Project".to_string(),
                url: "https://github.com/BeckhamLabsLLC/pairlink".to_string(),
            }],
        }
    }
}

/// Main configuration for pairlink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Directory holding one subdirectory per pairing session
    pub storage_root: PathBuf,
    /// Value of the `X-Signature` response header
    pub signature: String,
    /// Prefix of generated session identifiers
    pub session_prefix: String,
    /// Session timings
    pub policy: SessionPolicy,
    /// Conduit construction options
    pub conduit: ConduitOptions,
    /// Credential message layout
    pub message: MessageTemplate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 50900,
            storage_root: std::env::temp_dir().join("pairlink").join("sessions"),
            signature: "#6A11CB".to_string(),
            session_prefix: "PAIRLINK".to_string(),
            policy: SessionPolicy::default(),
            conduit: ConduitOptions::default(),
            message: MessageTemplate::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set the session storage root
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Builder pattern: set the response signature
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Builder pattern: set the session identifier prefix
    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    /// Builder pattern: set session timings
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder pattern: set conduit options
    pub fn with_conduit(mut self, conduit: ConduitOptions) -> Self {
        self.conduit = conduit;
        self
    }

    /// Builder pattern: set the message template
    pub fn with_message(mut self, message: MessageTemplate) -> Self {
        self.message = message;
        self
    }
}

/// Serialize durations as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conduit_options_wire_shape() {
        let json = serde_json::to_value(ConduitOptions::default()).unwrap();
        assert_eq!(json["printQrInTerminal"], false);
        assert_eq!(json["syncFullHistory"], false);
        assert_eq!(json["markOnlineOnConnect"], true);
        assert_eq!(json["connectTimeout"], 60_000);
        assert_eq!(json["keepAliveInterval"], 30_000);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_port(8080)
            .with_storage_root("/tmp/sessions")
            .with_session_prefix("TEST");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_root, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.session_prefix, "TEST");
    }

    #[test]
    fn test_conduit_override() {
        let config = Config::new().with_conduit(ConduitOptions {
            request_timeout: Duration::from_secs(5),
            ..ConduitOptions::default()
        });
        assert_eq!(config.conduit.request_timeout, Duration::from_secs(5));
        assert!(config.conduit.mark_online_on_connect);
    }
}
