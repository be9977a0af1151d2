//! Error types for slotname-node.

use crate::pattern::TemplateError;
use slotname_store::StoreError;
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, claiming or serving.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The name pattern failed to parse or render.
    #[error("name pattern error: {0}")]
    Template(#[from] TemplateError),

    /// Every ordinal in `[1, limit]` is held by another node.
    #[error("cluster is full: could not have more than {limit} nodes in the cluster")]
    ClusterFull { limit: u32 },

    /// The coordination store timed out or could not be reached.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A stored value is not a well-formed node identity.
    #[error("stored record is not a node identity: {0}")]
    Decode(serde_json::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
