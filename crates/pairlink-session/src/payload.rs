//! Packaging captured credentials for transmission
//!
//! The credential bytes are gzip-compressed, Base64-encoded and prefixed with
//! the template's marker. The result is placed both in the message text and in
//! a copy button.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::write::GzEncoder;
use flate2::Compression;
use pairlink_core::{Button, InteractiveMessage, MessageTemplate};
use std::io::Write;

/// Encoded credential text, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionPayload {
    text: String,
}

impl TransmissionPayload {
    /// Compress, encode and prefix `credential`
    pub fn build(prefix: &str, credential: &[u8]) -> std::io::Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(credential)?;
        let compressed = encoder.finish()?;

        Ok(Self {
            text: format!("{}{}", prefix, BASE64.encode(compressed)),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Wrap the payload in an interactive message laid out by `template`
    pub fn to_message(&self, template: &MessageTemplate) -> InteractiveMessage {
        let mut buttons = vec![Button::copy(&template.copy_label, &self.text)];
        buttons.extend(
            template
                .links
                .iter()
                .map(|link| Button::url(&link.label, &link.url)),
        );

        InteractiveMessage {
            title: template.title.clone(),
            text: self.text.clone(),
            footer: template.footer.clone(),
            buttons,
        }
    }
}
