//! Lease renewal for a held slot.
//!
//! ```text
//!            tick: absent or ours -> renew
//!           ┌────────┐
//!           ▼        │
//!        ACTIVE ─────┘
//!         │  │  │
//!         │  │  └── store unreachable ──────────▶ FAILED
//!         │  └───── tick: foreign value ────────▶ YIELDED
//!         └──────── cancellation token ─────────▶ CANCELLED
//! ```
//!
//! Every terminal state leaves the key alone. A cancelled node's name keeps
//! resolving until its current lease runs out, so nobody can reuse the slot
//! before the advertised TTL has passed.

use crate::claim::SlotClaim;
use crate::config::ClusterConfig;
use crate::error::Result;
use serde::Serialize;
use slotname_store::StoreClient;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the keeper is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeeperState {
    /// Renewing on every tick.
    Active,
    /// Another node's value occupies the key. This node no longer holds a slot.
    Yielded,
    /// Stopped by shutdown.
    Cancelled,
    /// The store could not be reached during a renewal.
    Failed,
}

impl KeeperState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, KeeperState::Active)
    }
}

impl std::fmt::Display for KeeperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Yielded => write!(f, "yielded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a single renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    Renewed,
    Yielded,
}

/// Keeps one [`SlotClaim`] alive.
pub struct LeaseKeeper {
    store: StoreClient,
    claim: SlotClaim,
    ttl_seconds: u64,
    interval: Duration,
    state_tx: watch::Sender<KeeperState>,
}

impl LeaseKeeper {
    pub fn new(store: StoreClient, claim: SlotClaim, config: &ClusterConfig) -> Self {
        let (state_tx, _) = watch::channel(KeeperState::Active);
        Self {
            store,
            claim,
            ttl_seconds: config.ttl_seconds,
            interval: config.renew_interval().max(Duration::from_millis(1)),
            state_tx,
        }
    }

    /// Watch the keeper's state.
    pub fn subscribe(&self) -> watch::Receiver<KeeperState> {
        self.state_tx.subscribe()
    }

    pub fn claim(&self) -> &SlotClaim {
        &self.claim
    }

    /// Renew until cancelled, yielded or failed. Returns the terminal state.
    ///
    /// Ticks never overlap: a renewal in flight when the token fires is
    /// allowed to finish (or time out) before the loop exits.
    pub async fn run(mut self, cancel: CancellationToken) -> KeeperState {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Lease keeper started for {} (every {:?})",
            self.claim.name, self.interval
        );

        let exit = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Lease keeper for {} cancelled, leaving key to expire", self.claim.name);
                    break KeeperState::Cancelled;
                }
                _ = ticker.tick() => match self.renew().await {
                    Ok(Renewal::Renewed) => {}
                    Ok(Renewal::Yielded) => break KeeperState::Yielded,
                    Err(e) => {
                        error!("Failed to renew {}: {}", self.claim.name, e);
                        break KeeperState::Failed;
                    }
                },
            }
        };

        self.state_tx.send_replace(exit);
        exit
    }

    /// One renewal attempt.
    ///
    /// An absent key is recreated, a key holding our own value is rebound to a
    /// fresh lease, and a key holding anything else is left alone. Both writes
    /// are conditional, so a node that slips in between the read and the
    /// write still wins.
    pub async fn renew(&mut self) -> Result<Renewal> {
        let name = self.claim.name.as_str();
        let current = self.store.get(name).await?;

        if let Some(ref value) = current {
            if *value != self.claim.value {
                warn!("Slot {} ({}) now belongs to another node, yielding", self.claim.ordinal, name);
                return Ok(Renewal::Yielded);
            }
        }

        let lease = self.store.grant_lease(self.ttl_seconds).await?;
        let written = match current {
            None => {
                warn!("Key {} expired before renewal, recreating", name);
                self.store.create_if_absent(name, &self.claim.value, lease).await?
            }
            Some(_) => {
                let replaced = self
                    .store
                    .replace_if_equal(name, &self.claim.value, &self.claim.value, lease)
                    .await?;
                if replaced {
                    true
                } else if self.store.get(name).await?.is_none() {
                    warn!("Key {} expired during renewal, recreating", name);
                    self.store.create_if_absent(name, &self.claim.value, lease).await?
                } else {
                    false
                }
            }
        };

        if !written {
            warn!("Slot {} ({}) taken during renewal, yielding", self.claim.ordinal, name);
            if let Err(e) = self.store.revoke_lease(lease).await {
                warn!("Failed to revoke unused lease {}: {}", lease, e);
            }
            return Ok(Renewal::Yielded);
        }

        debug!("Renewed {} with lease {}", name, lease);
        self.claim.lease = lease;
        Ok(Renewal::Renewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::negotiate;
    use crate::identity::NodeIdentity;
    use crate::pattern::NamePattern;
    use slotname_store::{CoordinationStore, LeaseId, MemoryStore, DEFAULT_TIMEOUT};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    const NAME: &str = "worker1.tf.local.";

    async fn claimed(store: &Arc<MemoryStore>) -> LeaseKeeper {
        let config = ClusterConfig::new(NamePattern::parse("worker{{ordinal}}.tf.local.").unwrap())
            .with_limit(5)
            .with_ttl(20);
        let client = StoreClient::new(store.clone(), DEFAULT_TIMEOUT);
        let identity = NodeIdentity::new(Some(Ipv4Addr::new(10, 0, 0, 1)), None, 53);
        let claim = negotiate(&client, &config, &identity).await.unwrap();
        LeaseKeeper::new(client, claim, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn holder_keeps_slot_past_many_ttls() {
        let store = Arc::new(MemoryStore::new());
        let keeper = claimed(&store).await;
        let value = keeper.claim().value.clone();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(keeper.run(cancel.clone()));

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(15)).await;
            assert_eq!(store.get(NAME).await.unwrap(), Some(value.clone()));
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), KeeperState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_keeper_lets_key_expire() {
        let store = Arc::new(MemoryStore::new());
        let keeper = claimed(&store).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(keeper.run(cancel).await, KeeperState::Cancelled);

        // No delete was issued
        assert!(store.get(NAME).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(store.get(NAME).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn yields_to_foreign_value() {
        let store = Arc::new(MemoryStore::new());
        let keeper = claimed(&store).await;
        let states = keeper.subscribe();
        store.put(NAME, br#"{"ipv4":"10.0.0.9","port":53}"#, None).await.unwrap();

        let exit = keeper.run(CancellationToken::new()).await;
        assert_eq!(exit, KeeperState::Yielded);
        assert_eq!(*states.borrow(), KeeperState::Yielded);
        assert_eq!(
            store.get(NAME).await.unwrap(),
            Some(br#"{"ipv4":"10.0.0.9","port":53}"#.to_vec())
        );
    }

    #[tokio::test]
    async fn recreates_expired_key() {
        let store = Arc::new(MemoryStore::new());
        let mut keeper = claimed(&store).await;
        let old_lease = keeper.claim().lease;
        store.revoke_lease(old_lease).await.unwrap();
        assert_eq!(store.get(NAME).await.unwrap(), None);

        assert_eq!(keeper.renew().await.unwrap(), Renewal::Renewed);
        assert_ne!(keeper.claim().lease, old_lease);
        assert_eq!(store.get(NAME).await.unwrap(), Some(keeper.claim().value.clone()));
    }

    /// Drops the key (by revoking its lease) just before a replace, so the
    /// compare sees an absent key.
    struct ExpiresBeforeReplace {
        inner: Arc<MemoryStore>,
        stale: LeaseId,
    }

    #[async_trait::async_trait]
    impl CoordinationStore for ExpiresBeforeReplace {
        async fn get(&self, key: &str) -> slotname_store::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
        async fn put(
            &self,
            key: &str,
            value: &[u8],
            lease: Option<LeaseId>,
        ) -> slotname_store::Result<()> {
            self.inner.put(key, value, lease).await
        }
        async fn create_if_absent(
            &self,
            key: &str,
            value: &[u8],
            lease: LeaseId,
        ) -> slotname_store::Result<bool> {
            self.inner.create_if_absent(key, value, lease).await
        }
        async fn replace_if_equal(
            &self,
            key: &str,
            expected: &[u8],
            value: &[u8],
            lease: LeaseId,
        ) -> slotname_store::Result<bool> {
            self.inner.revoke_lease(self.stale).await?;
            self.inner.replace_if_equal(key, expected, value, lease).await
        }
        async fn grant_lease(&self, ttl_seconds: u64) -> slotname_store::Result<LeaseId> {
            self.inner.grant_lease(ttl_seconds).await
        }
        async fn revoke_lease(&self, lease: LeaseId) -> slotname_store::Result<()> {
            self.inner.revoke_lease(lease).await
        }
    }

    #[tokio::test]
    async fn key_expiring_mid_renewal_is_recreated() {
        let store = Arc::new(MemoryStore::new());
        let claim = claimed(&store).await.claim().clone();
        let config = ClusterConfig::new(NamePattern::parse("worker{{ordinal}}.tf.local.").unwrap());
        let racing = Arc::new(ExpiresBeforeReplace {
            inner: store.clone(),
            stale: claim.lease,
        });
        let mut keeper = LeaseKeeper::new(StoreClient::new(racing, DEFAULT_TIMEOUT), claim, &config);

        assert_eq!(keeper.renew().await.unwrap(), Renewal::Renewed);
        assert_eq!(store.get(NAME).await.unwrap(), Some(keeper.claim().value.clone()));
    }

    #[tokio::test]
    async fn renewal_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut keeper = claimed(&store).await;
        let value = keeper.claim().value.clone();
        for _ in 0..5 {
            assert_eq!(keeper.renew().await.unwrap(), Renewal::Renewed);
            assert_eq!(store.get(NAME).await.unwrap(), Some(value.clone()));
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_ends_loop() {
        let store = Arc::new(MemoryStore::new());
        let keeper = claimed(&store).await;
        store.set_available(false);
        assert_eq!(keeper.run(CancellationToken::new()).await, KeeperState::Failed);
    }
}
