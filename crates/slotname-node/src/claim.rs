//! Slot negotiation.
//!
//! A joining node walks the ordinal pool in order and takes the first name
//! nobody holds:
//!
//! ```text
//! ordinal 1: worker1.tf.local.  present  -> taken, try next
//! ordinal 2: worker2.tf.local.  absent   -> grant lease, create-if-absent
//!                                            won  -> claim ordinal 2
//!                                            lost -> revoke lease, try next
//! ...
//! ordinal > limit                         -> ClusterFull
//! ```
//!
//! The write is a conditional create, so two nodes that both saw ordinal K
//! free cannot both end up holding it: the loser simply moves on to K+1.

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::identity::NodeIdentity;
use slotname_store::{LeaseId, StoreClient};
use tracing::{debug, info, warn};

/// A slot held by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    /// Ordinal in `[1, limit]`
    pub ordinal: u32,
    /// Name rendered from the pattern
    pub name: String,
    /// Serialized [`NodeIdentity`] stored at `name`
    pub value: Vec<u8>,
    /// Lease the key is currently bound to
    pub lease: LeaseId,
}

/// Find and claim a free ordinal.
pub async fn negotiate(
    store: &StoreClient,
    config: &ClusterConfig,
    identity: &NodeIdentity,
) -> Result<SlotClaim> {
    let value = identity.encode()?;

    for ordinal in 1..=config.limit {
        let name = config.pattern.render(ordinal)?;

        if store.get(&name).await?.is_some() {
            debug!("Slot {} ({}) already taken", ordinal, name);
            continue;
        }

        let lease = store.grant_lease(config.ttl_seconds).await?;
        if store.create_if_absent(&name, &value, lease).await? {
            info!(
                "Claimed slot {} as {} (lease {}, ttl {}s)",
                ordinal, name, lease, config.ttl_seconds
            );
            return Ok(SlotClaim {
                ordinal,
                name,
                value,
                lease,
            });
        }

        warn!("Lost race for slot {} ({}), trying next", ordinal, name);
        // The lease would expire on its own; revoking just frees it sooner.
        if let Err(e) = store.revoke_lease(lease).await {
            warn!("Failed to revoke unused lease {}: {}", lease, e);
        }
    }

    Err(Error::ClusterFull {
        limit: config.limit,
    })
}
