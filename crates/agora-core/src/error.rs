//! Library error taxonomy.
//!
//! Malformed zap invoices/descriptions are deliberately NOT represented here:
//! they degrade to defaults through a named fallback path (see
//! [`crate::sync::zap`]) instead of surfacing as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unknown notification kind: {0}")]
    UnknownKind(String),
}

/// Surfaced to the UI as a user-visible message, never retried automatically.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("no stored credentials")]
    NoCredentials,

    #[error("stored key is encrypted, password required")]
    PasswordRequired,

    #[error("could not decrypt stored key: {0}")]
    Decrypt(String),

    #[error("external signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Relay/network failures during sync or manual fetches. Logged, the affected
/// category is skipped and the loop continues on schedule.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("relay error: {0}")]
    Relay(String),

    #[error("fetch timed out")]
    Timeout,
}

/// Surfaced to the publishing form with the underlying message; the user may
/// retry manually.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not logged in")]
    NotAuthenticated,

    #[error("{0} must not be empty")]
    EmptyDraft(&'static str),

    #[error("unknown board: {0}")]
    UnknownBoard(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("relay rejected event: {0}")]
    Relay(String),
}
