//! Credential storage for pairing sessions
//!
//! Every session owns one directory under the storage root, named after its
//! session identifier. The conduit writes its auth state there; the
//! orchestrator only checks for, reads and finally removes it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File whose size signals that credential material has been written
pub const CREDENTIAL_FILE: &str = "creds.json";

/// Credential files at or below this size are treated as not yet written
pub const MIN_CREDENTIAL_BYTES: usize = 100;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Credential file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether `bytes` is complete enough to be transmitted
pub fn is_valid_credential(bytes: &[u8]) -> bool {
    bytes.len() > MIN_CREDENTIAL_BYTES
}

/// Filesystem adapter rooted at the session storage directory
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn with_root(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!("Credential store rooted at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by one session
    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    /// Path of a session's credential file
    pub fn credential_path(&self, session: &str) -> PathBuf {
        self.session_dir(session).join(CREDENTIAL_FILE)
    }

    /// Check whether `path` exists
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Read a whole file
    pub async fn read_all(&self, path: &Path) -> StoreResult<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Recursively remove `path`; a missing path counts as removed
    pub async fn remove_tree(&self, path: &Path) -> StoreResult<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!("Removed {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of session directories currently on disk
    pub async fn session_count(&self) -> StoreResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}
