//! slotname - Coordinator-free ordinal names for identical nodes
//!
//! Every node in a fleet runs the same binary with the same config. On start
//! each node claims the lowest free ordinal from a fixed pool by writing its
//! address under the rendered name in a shared lease-capable store, then
//! keeps renewing the lease. Any node can answer A/AAAA queries for any
//! claimed name by reading the store.
//!
//! # Architecture
//!
//! - **Pattern**: renders `worker{{ordinal}}.tf.local.` into names
//! - **Claim**: walks the pool and takes the first free ordinal atomically
//! - **Lease**: renews the claim every half TTL until cancelled or yielded
//! - **Responder**: turns a stored identity into A/AAAA answers
//! - **Resolve Socket**: Unix socket for query and status commands
//!   (slotname-query CLI)
//!
//! # Example
//!
//! ```no_run
//! use slotname_node::{connect_store, NodeConfig, NodeIdentity, SlotNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let identity = NodeIdentity::discover(config.port, config.ipv4, config.ipv6).await?;
//!     let store = connect_store(&config).await?;
//!     let node = SlotNode::start(&config.cluster, identity, store).await?;
//!     println!("serving as {}", node.name());
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod claim;
pub mod config;
pub mod error;
pub mod identity;
pub mod lease;
pub mod node;
pub mod pattern;
pub mod resolve_socket;
pub mod responder;

pub use claim::{negotiate, SlotClaim};
pub use config::{ClusterConfig, NodeConfig, StoreBackend};
pub use error::{Error, Result};
pub use identity::NodeIdentity;
pub use lease::{KeeperState, LeaseKeeper, Renewal};
pub use node::{connect_store, NodeStatus, SlotNode, StatusHandle};
pub use pattern::{normalize_name, NamePattern, TemplateError};
pub use resolve_socket::ResolveSocket;
pub use responder::{AddressData, AddressRecord, Answer, QueryResponder, RecordType};
