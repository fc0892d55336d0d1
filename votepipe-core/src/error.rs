use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a credential from its source.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("failed to read credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("credential source `{0}` produced an empty secret")]
    Empty(String),
}

/// Failure to open a connection to an endpoint.
///
/// Transport and authentication failures are retried the same way; the split
/// exists so an auth rejection can force a fresh credential on the next
/// attempt.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("{endpoint} unreachable: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{endpoint} rejected credentials: {reason}")]
    Auth { endpoint: String, reason: String },

    #[error("{endpoint} connected but is not ready: {reason}")]
    NotReady { endpoint: String, reason: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl ConnectError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ConnectError::Auth { .. })
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue connection lost: {0}")]
    Disconnected(String),

    #[error("queue command failed: {0}")]
    Command(String),
}

impl QueueError {
    /// Whether the connection that produced this error must be discarded.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, QueueError::Disconnected(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection lost: {0}")]
    Disconnected(String),

    #[error("store rejected credentials: {0}")]
    Auth(String),

    #[error("store query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Whether the connection that produced this error must be discarded.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, StoreError::Disconnected(_) | StoreError::Auth(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Auth(_))
    }
}
