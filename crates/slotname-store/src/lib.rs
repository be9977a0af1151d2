//! slotname-store - Coordination store access for slot negotiation
//!
//! Nodes in a slotname fleet never talk to each other. Everything they agree
//! on lives in a shared key-value store with TTL leases, and this crate is
//! the only way the rest of the workspace reaches it.
//!
//! # Overview
//!
//! - [`CoordinationStore`]: the backend contract (get, put, leases and the
//!   two conditional writes used to close claim races)
//! - [`EtcdStore`]: etcd v3 backend
//! - [`MemoryStore`]: in-process backend with lease expiry, used for tests
//!   and single-host development
//! - [`StoreClient`]: bounds every call with a timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use slotname_store::{MemoryStore, StoreClient};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = StoreClient::new(Arc::new(MemoryStore::new()), Duration::from_secs(5));
//! let lease = client.grant_lease(20).await?;
//! client.create_if_absent("worker1.tf.local.", b"{}", lease).await?;
//! ```

pub mod client;
pub mod error;
pub mod etcd;
pub mod memory;
pub mod store;

pub use client::{StoreClient, DEFAULT_TIMEOUT};
pub use error::{Result, StoreError};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use store::{CoordinationStore, LeaseId, MAX_LEASE_TTL_SECONDS};
