//! One-shot reply handle for the originating HTTP request

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Failure codes surfaced to the HTTP caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCode {
    /// The conduit could not be reached or refused the pairing request
    #[serde(rename = "CHAMBER_TEMPORARILY_SEALED")]
    Sealed,
    /// The session ended without producing a pairing code
    #[serde(rename = "ESSENCE_DISPERSION")]
    Dispersion,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::Sealed => "CHAMBER_TEMPORARILY_SEALED",
            FailureCode::Dispersion => "ESSENCE_DISPERSION",
        }
    }
}

/// The single reply a pairing request receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingReply {
    /// Pairing code to enter on the remote device
    Code { code: String, timestamp: String },
    /// Pairing could not start
    Failed { code: FailureCode, message: String },
}

impl PairingReply {
    /// Reply used when the conduit is unreachable
    pub fn sealed() -> Self {
        PairingReply::Failed {
            code: FailureCode::Sealed,
            message: "The pairing service is temporarily unavailable. Please try again later."
                .to_string(),
        }
    }

    /// Reply used when the session ended without a pairing code
    pub fn dispersion() -> Self {
        PairingReply::Failed {
            code: FailureCode::Dispersion,
            message: "The pairing session failed to start.".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("A reply was already sent for this request")]
    AlreadySent,
}

/// Completes exactly once; every later completion is rejected
#[derive(Debug)]
pub struct Responder {
    tx: Option<oneshot::Sender<PairingReply>>,
}

impl Responder {
    /// Create a responder and the receiver the request handler awaits
    pub fn channel() -> (Self, oneshot::Receiver<PairingReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Whether no reply has been sent yet
    pub fn is_pending(&self) -> bool {
        self.tx.is_some()
    }

    /// Send the reply
    ///
    /// A caller that already went away still consumes the responder.
    pub fn complete(&mut self, reply: PairingReply) -> Result<(), ResponseError> {
        let tx = self.tx.take().ok_or(ResponseError::AlreadySent)?;
        if tx.send(reply).is_err() {
            debug!("Reply receiver dropped before completion");
        }
        Ok(())
    }

    /// Send the reply only if none was sent yet
    pub fn complete_if_pending(&mut self, reply: PairingReply) -> bool {
        self.complete(reply).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_once() {
        let (mut responder, rx) = Responder::channel();
        assert!(responder.is_pending());

        responder
            .complete(PairingReply::Code {
                code: "ABCD1234".to_string(),
                timestamp: "20260101-0000".to_string(),
            })
            .unwrap();
        assert!(!responder.is_pending());
        assert_eq!(
            responder.complete(PairingReply::sealed()),
            Err(ResponseError::AlreadySent)
        );
        assert!(!responder.complete_if_pending(PairingReply::dispersion()));

        match rx.await.unwrap() {
            PairingReply::Code { code, .. } => assert_eq!(code, "ABCD1234"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_still_consumes() {
        let (mut responder, rx) = Responder::channel();
        drop(rx);
        assert!(responder.complete(PairingReply::sealed()).is_ok());
        assert!(!responder.is_pending());
    }

    #[test]
    fn test_failure_code_wire_names() {
        assert_eq!(
            serde_json::to_value(FailureCode::Sealed).unwrap(),
            "CHAMBER_TEMPORARILY_SEALED"
        );
        assert_eq!(FailureCode::Dispersion.as_str(), "ESSENCE_DISPERSION");
    }
}
