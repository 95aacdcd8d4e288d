//! Error types for the leader engine

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, LeaderError>;

/// Errors surfaced by a reconciliation pass or one of its collaborators
#[derive(Debug, Error)]
pub enum LeaderError {
    /// A watched key did not match `<desired-root>/<node>/device/<device>`
    #[error("malformed device key: {0}")]
    MalformedKey(String),

    /// The cluster id or one of the cluster secrets could not be generated
    #[error("failed to generate cluster identity: {0}")]
    IdentityGeneration(String),

    /// A get/set/list/watch against the distributed store failed
    #[error("store operation on {key} failed: {message}")]
    Store { key: String, message: String },

    /// The node inventory could not be read
    #[error("inventory unavailable: {0}")]
    Inventory(String),

    /// An external command exited unsuccessfully or could not be spawned
    #[error("command {command} failed: {message}")]
    Command { command: String, message: String },

    /// A command executor was asked to run something it does not know
    #[error("unrecognized command: {command} {args:?}")]
    UnrecognizedCommand { command: String, args: Vec<String> },

    /// A stored value could not be interpreted
    #[error("invalid value {value:?} at {key}")]
    InvalidValue { key: String, value: String },
}

impl LeaderError {
    /// Build a store error for the given key
    pub fn store(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        LeaderError::Store {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the error only concerns a single watch event and the
    /// caller should skip the event rather than fail
    pub fn is_skippable(&self) -> bool {
        matches!(self, LeaderError::MalformedKey(_))
    }
}
