//! Session identifiers
//!
//! A session identifier has the shape `<prefix>~<file id>#<key>`:
//! the file id is 11 or 12 alphanumeric characters and the key is 43 or 44
//! Base64URL characters. The identifier doubles as the name of the session's
//! storage directory.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FILE_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const KEY_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Separator between prefix and body
pub const PREFIX_MARKER: char = '~';
/// Separator between file id and key
pub const SEGMENT_SEPARATOR: char = '#';

/// Allowed file id lengths
pub const FILE_ID_LENGTHS: [usize; 2] = [11, 12];
/// Allowed key lengths
pub const KEY_LENGTHS: [usize; 2] = [43, 44];
/// Allowed total length of the body after the prefix
pub const BODY_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 55..=57;

/// Why a session identifier was rejected, in check order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSessionId {
    #[error("Session ID is empty")]
    Empty,
    #[error("Must start with '{0}'")]
    MissingPrefix(String),
    #[error("Must contain '#' separator")]
    MissingSeparator,
    #[error("Must have exactly two parts separated by '#'")]
    InvalidParts,
    #[error("File ID must be 11-12 chars (got {0})")]
    FileIdLength(usize),
    #[error("File ID contains invalid characters")]
    FileIdChars,
    #[error("Key must be 43-44 chars (got {0})")]
    KeyLength(usize),
    #[error("Key contains invalid characters")]
    KeyChars,
    #[error("Total length must be 55-57 chars (got {0})")]
    TotalLength(usize),
}

impl InvalidSessionId {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            InvalidSessionId::Empty => "empty",
            InvalidSessionId::MissingPrefix(_) => "missing_prefix",
            InvalidSessionId::MissingSeparator => "missing_separator",
            InvalidSessionId::InvalidParts => "invalid_parts",
            InvalidSessionId::FileIdLength(_) => "invalid_file_id_length",
            InvalidSessionId::FileIdChars => "invalid_file_id_chars",
            InvalidSessionId::KeyLength(_) => "invalid_key_length",
            InvalidSessionId::KeyChars => "invalid_key_chars",
            InvalidSessionId::TotalLength(_) => "invalid_total_length",
        }
    }
}

/// A generated session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates and validates session identifiers for one prefix
#[derive(Debug, Clone)]
pub struct SessionIdFormat {
    /// Prefix including the trailing marker, e.g. `PAIRLINK~`
    marker: String,
}

impl SessionIdFormat {
    pub fn new(prefix: &str) -> Self {
        Self {
            marker: format!("{}{}", prefix, PREFIX_MARKER),
        }
    }

    /// Generate a new identifier
    ///
    /// Segment lengths are picked first, so the result always validates.
    pub fn generate(&self) -> SessionId {
        let mut rng = rand::thread_rng();
        // 70% 11 chars, 30% 12 chars
        let file_len = if rng.gen_bool(0.7) { 11 } else { 12 };
        // 60% 43 chars, 40% 44 chars
        let key_len = if rng.gen_bool(0.6) { 43 } else { 44 };

        let file_id = random_string(&mut rng, FILE_ID_CHARS, file_len);
        let key = random_string(&mut rng, KEY_CHARS, key_len);

        SessionId(format!(
            "{}{}{}{}",
            self.marker, file_id, SEGMENT_SEPARATOR, key
        ))
    }

    /// Check `id` against the format, reporting the first rule it breaks
    pub fn validate(&self, id: &str) -> Result<(), InvalidSessionId> {
        if id.is_empty() {
            return Err(InvalidSessionId::Empty);
        }

        let body = id
            .strip_prefix(self.marker.as_str())
            .ok_or_else(|| InvalidSessionId::MissingPrefix(self.marker.clone()))?;

        let mut parts = body.split(SEGMENT_SEPARATOR);
        let (file_id, key) = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), None, _) => return Err(InvalidSessionId::MissingSeparator),
            (Some(file_id), Some(key), None) => (file_id, key),
            _ => return Err(InvalidSessionId::InvalidParts),
        };

        if !FILE_ID_LENGTHS.contains(&file_id.len()) {
            return Err(InvalidSessionId::FileIdLength(file_id.len()));
        }
        if !file_id.bytes().all(|b| FILE_ID_CHARS.contains(&b)) {
            return Err(InvalidSessionId::FileIdChars);
        }

        if !KEY_LENGTHS.contains(&key.len()) {
            return Err(InvalidSessionId::KeyLength(key.len()));
        }
        if !key.bytes().all(|b| KEY_CHARS.contains(&b)) {
            return Err(InvalidSessionId::KeyChars);
        }

        if !BODY_LENGTH_RANGE.contains(&body.len()) {
            return Err(InvalidSessionId::TotalLength(body.len()));
        }

        Ok(())
    }
}

fn random_string(rng: &mut impl Rng, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
