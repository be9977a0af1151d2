//! Error types for slotname-store.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the coordination store.
///
/// Apart from a rejected lease TTL, every variant means the store could not
/// be reached or did not answer in time. Callers decide whether that is fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call did not complete within the client timeout.
    #[error("store {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The transport to the store failed.
    #[error("store transport error: {0}")]
    Transport(String),

    /// The store is reachable but refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The lease referenced by a write does not exist (expired or revoked).
    #[error("lease {0} not found")]
    LeaseNotFound(i64),

    /// A lease was requested with a TTL the store cannot represent.
    #[error("lease ttl {0}s is out of range")]
    LeaseTtlOutOfRange(u64),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}
