//! The coordination store contract.

use crate::error::Result;
use async_trait::async_trait;

/// Longest lease etcd will grant.
pub const MAX_LEASE_TTL_SECONDS: u64 = 9_000_000_000;

/// Opaque lease handle issued by the store.
///
/// Keys written with a lease are removed by the store once the lease expires
/// without being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(pub i64);

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A networked key-value store with TTL leases and compare-then-put.
///
/// Implementations must give read-after-write visibility for keys the
/// caller itself wrote.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read the value at `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditionally write `value` at `key`, optionally bound to a lease.
    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<()>;

    /// Write `value` at `key` bound to `lease` only if `key` does not exist.
    /// Returns whether the write happened.
    async fn create_if_absent(&self, key: &str, value: &[u8], lease: LeaseId) -> Result<bool>;

    /// Write `value` at `key` bound to `lease` only if the current value
    /// equals `expected`. Returns whether the write happened.
    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        lease: LeaseId,
    ) -> Result<bool>;

    /// Grant a new lease living `ttl_seconds`.
    async fn grant_lease(&self, ttl_seconds: u64) -> Result<LeaseId>;

    /// Revoke a lease, deleting every key bound to it.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<()>;
}
