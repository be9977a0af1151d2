//! Slot node - the application entry point.
//!
//! Lifecycle:
//! - Validate cluster config (before any network activity)
//! - Negotiate a slot
//! - Spawn the lease keeper, bound to a cancellation token
//! - Answer queries until shutdown

use crate::claim::{negotiate, SlotClaim};
use crate::config::{ClusterConfig, NodeConfig, StoreBackend};
use crate::error::{Error, Result};
use crate::identity::NodeIdentity;
use crate::lease::{KeeperState, LeaseKeeper};
use crate::responder::QueryResponder;
use serde::Serialize;
use slotname_store::{CoordinationStore, EtcdStore, MemoryStore, StoreClient};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Open the configured store backend.
pub async fn connect_store(config: &NodeConfig) -> Result<StoreClient> {
    let store: Arc<dyn CoordinationStore> = match config.backend {
        StoreBackend::Etcd => {
            Arc::new(EtcdStore::connect(&config.cluster.endpoints, config.store_timeout).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store: slots are not shared with other nodes");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(StoreClient::new(store, config.store_timeout))
}

/// Point-in-time view of a node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub ordinal: u32,
    pub name: String,
    pub identity: String,
    pub keeper: KeeperState,
}

/// Cloneable handle for reading a node's status.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    ordinal: u32,
    name: String,
    identity: String,
    keeper: watch::Receiver<KeeperState>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> NodeStatus {
        NodeStatus {
            ordinal: self.ordinal,
            name: self.name.clone(),
            identity: self.identity.clone(),
            keeper: *self.keeper.borrow(),
        }
    }
}

/// A running node holding one slot.
pub struct SlotNode {
    claim: SlotClaim,
    identity: NodeIdentity,
    responder: QueryResponder,
    status: StatusHandle,
    cancel: CancellationToken,
    keeper: JoinHandle<KeeperState>,
}

impl SlotNode {
    /// Claim a slot and start keeping it alive.
    pub async fn start(
        config: &ClusterConfig,
        identity: NodeIdentity,
        store: StoreClient,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            "Negotiating slot: pattern {}, limit {}, ttl {}s",
            config.pattern,
            config.limit,
            config.ttl_seconds
        );

        let claim = negotiate(&store, config, &identity).await?;
        let keeper = LeaseKeeper::new(store.clone(), claim.clone(), config);
        let status = StatusHandle {
            ordinal: claim.ordinal,
            name: claim.name.clone(),
            identity: identity.to_string(),
            keeper: keeper.subscribe(),
        };

        let cancel = CancellationToken::new();
        let keeper = tokio::spawn(keeper.run(cancel.clone()));

        Ok(Self {
            claim,
            identity,
            responder: QueryResponder::new(store),
            status,
            cancel,
            keeper,
        })
    }

    /// The claim as negotiated. The keeper rebinds it to fresh leases.
    pub fn claim(&self) -> &SlotClaim {
        &self.claim
    }

    pub fn ordinal(&self) -> u32 {
        self.claim.ordinal
    }

    pub fn name(&self) -> &str {
        &self.claim.name
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn responder(&self) -> QueryResponder {
        self.responder.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn keeper_state(&self) -> KeeperState {
        *self.status.keeper.borrow()
    }

    /// Token cancelled on shutdown; other services can stop with the node.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop renewing and wait for the keeper to exit. The key is left to
    /// expire with its current lease.
    pub async fn shutdown(self) -> Result<KeeperState> {
        self.cancel.cancel();
        let state = self
            .keeper
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        tracing::info!("Node {} stopped (keeper {})", self.claim.name, state);
        Ok(state)
    }
}
