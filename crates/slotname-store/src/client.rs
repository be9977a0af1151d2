//! Timeout-bounded access to a [`CoordinationStore`].

use crate::error::{Result, StoreError};
use crate::store::{CoordinationStore, LeaseId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-call timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the coordination store.
///
/// Every call is bounded by `timeout`; an elapsed call surfaces as
/// [`StoreError::Timeout`] and is never retried here.
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn CoordinationStore>,
    timeout: Duration,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Wrap a backend with the given per-call timeout.
    pub fn new(store: Arc<dyn CoordinationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded("get", self.store.get(key)).await
    }

    pub async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<()> {
        self.bounded("put", self.store.put(key, value, lease)).await
    }

    pub async fn create_if_absent(&self, key: &str, value: &[u8], lease: LeaseId) -> Result<bool> {
        self.bounded("create", self.store.create_if_absent(key, value, lease))
            .await
    }

    pub async fn replace_if_equal(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        lease: LeaseId,
    ) -> Result<bool> {
        self.bounded(
            "replace",
            self.store.replace_if_equal(key, expected, value, lease),
        )
        .await
    }

    pub async fn grant_lease(&self, ttl_seconds: u64) -> Result<LeaseId> {
        self.bounded("lease grant", self.store.grant_lease(ttl_seconds))
            .await
    }

    pub async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        self.bounded("lease revoke", self.store.revoke_lease(lease))
            .await
    }
}
