//! In-process coordination store with lease expiry.
//!
//! Leases expire on the tokio clock, so tests running with a paused runtime
//! can step across TTL boundaries without real sleeps.

use crate::error::{Result, StoreError};
use crate::store::{CoordinationStore, LeaseId, MAX_LEASE_TTL_SECONDS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    lease: Option<LeaseId>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Live leases and their deadlines.
    leases: HashMap<LeaseId, Instant>,
    next_lease: i64,
}

impl State {
    /// Drop expired leases and every key bound to them.
    fn sweep(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.drop_lease(id);
        }
    }

    fn drop_lease(&mut self, id: LeaseId) {
        self.leases.remove(&id);
        self.entries.retain(|_, e| e.lease != Some(id));
    }

    fn check_lease(&self, lease: Option<LeaseId>) -> Result<()> {
        match lease {
            Some(id) if !self.leases.contains_key(&id) => Err(StoreError::LeaseNotFound(id.0)),
            _ => Ok(()),
        }
    }

    fn write(&mut self, key: &str, value: &[u8], lease: Option<LeaseId>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                lease,
            },
        );
    }
}

/// Memory-backed [`CoordinationStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_lease: 1,
                ..Default::default()
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let mut state = self.state.write().await;
        state.sweep(Instant::now());
        state.entries.len()
    }

    /// Whether the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lock_live(&self) -> Result<tokio::sync::RwLockWriteGuard<'_, State>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let mut state = self.state.write().await;
        state.sweep(Instant::now());
        Ok(state)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.lock_live().await?;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<()> {
        let mut state = self.lock_live().await?;
        state.check_lease(lease)?;
        state.write(key, value, lease);
        Ok(())
    }

    async fn create_if_absent(&self, key: &str, value: &[u8], lease: LeaseId) -> Result<bool> {
        let mut state = self.lock_live().await?;
        state.check_lease(Some(lease))?;
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.write(key, value, Some(lease));
        Ok(true)
    }

    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        lease: LeaseId,
    ) -> Result<bool> {
        let mut state = self.lock_live().await?;
        state.check_lease(Some(lease))?;
        match state.entries.get(key) {
            Some(e) if e.value == expected => {
                state.write(key, value, Some(lease));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn grant_lease(&self, ttl_seconds: u64) -> Result<LeaseId> {
        let mut state = self.lock_live().await?;
        let deadline = Some(ttl_seconds)
            .filter(|&ttl| ttl <= MAX_LEASE_TTL_SECONDS)
            .and_then(|ttl| Instant::now().checked_add(Duration::from_secs(ttl)))
            .ok_or(StoreError::LeaseTtlOutOfRange(ttl_seconds))?;
        let id = LeaseId(state.next_lease);
        state.next_lease += 1;
        state.leases.insert(id, deadline);
        Ok(id)
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        let mut state = self.lock_live().await?;
        state.drop_lease(lease);
        Ok(())
    }
}
