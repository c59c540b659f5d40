//! Error types for passtree.

use crate::library::LibraryError;
use crate::reconstruct::Corruption;
use crate::session::SessionId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which filesystem step failed while reading a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStage {
    Open,
    Stat,
    Read,
}

impl fmt::Display for IoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoStage::Open => "open",
            IoStage::Stat => "stat",
            IoStage::Read => "read",
        })
    }
}

/// Main error type for passtree operations.
#[derive(Error, Debug)]
pub enum PassTreeError {
    #[error("Cannot {stage} {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        stage: IoStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Error loading database {}: {reason}", path.display())]
    DecryptionFailed {
        path: PathBuf,
        #[source]
        reason: LibraryError,
    },

    #[error("Structural corruption: {0}")]
    StructuralCorruption(#[from] Corruption),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("No cached credential for {0}")]
    CredentialMissing(SessionId),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Clipboard operation failed")]
    ClipboardFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("{0}")]
    Other(String),
}

impl PassTreeError {
    /// Whether the caller can recover by retrying with a different password.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, PassTreeError::DecryptionFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, PassTreeError>;
