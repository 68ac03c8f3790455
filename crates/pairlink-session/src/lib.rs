//! Pairlink Session - Pairing session orchestration
//!
//! Runs the lifecycle of a single linking attempt against an external
//! messaging conduit: connect, issue a pairing code, wait for the link,
//! capture the credential material the conduit writes, deliver it to the
//! linked account, and remove every session artifact afterwards.
//!
//! # Example
//!
//! ```no_run
//! use pairlink_core::{Config, ConduitConnector};
//! use pairlink_session::{CredentialStore, PairingOrchestrator, PairingReply};
//! use std::sync::Arc;
//!
//! async fn example(connector: Arc<dyn ConduitConnector>) {
//!     let config = Config::default();
//!     let store = CredentialStore::with_root(&config.storage_root).await.unwrap();
//!     let orchestrator = Arc::new(PairingOrchestrator::new(connector, store, &config));
//!
//!     match orchestrator.pair("+1 555 010 0000").await {
//!         PairingReply::Code { code, .. } => println!("Enter {} on the device", code),
//!         PairingReply::Failed { code, message } => eprintln!("{}: {}", code.as_str(), message),
//!     }
//! }
//! ```

pub mod codes;
pub mod orchestrator;
pub mod payload;
pub mod responder;
pub mod session;
pub mod session_id;
pub mod store;

#[cfg(test)]
mod testing;

pub use codes::{communion_code, normalize_number, reply_timestamp};
pub use orchestrator::{
    PairingError, PairingOrchestrator, PairingResult, SessionHandle, SessionOutcome,
};
pub use payload::TransmissionPayload;
pub use responder::{FailureCode, PairingReply, Responder, ResponseError};
pub use session::{Session, SessionState};
pub use session_id::{InvalidSessionId, SessionId, SessionIdFormat};
pub use store::{
    is_valid_credential, CredentialStore, StoreError, StoreResult, CREDENTIAL_FILE,
    MIN_CREDENTIAL_BYTES,
};
