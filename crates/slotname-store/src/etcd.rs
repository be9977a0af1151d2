//! etcd v3 backend.

use crate::error::{Result, StoreError};
use crate::store::{CoordinationStore, LeaseId, MAX_LEASE_TTL_SECONDS};
use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, PutOptions, Txn, TxnOp};
use std::time::Duration;
use tracing::{debug, info};

/// Coordination store backed by an etcd cluster.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the given etcd endpoints.
    pub async fn connect(endpoints: &[String], connect_timeout: Duration) -> Result<Self> {
        let options = ConnectOptions::new().with_connect_timeout(connect_timeout);
        let client = Client::connect(endpoints, Some(options)).await?;
        info!("Connected to etcd at {}", endpoints.join(","));
        Ok(Self { client })
    }

    // etcd_client::Client is a cheap handle; each call works on its own copy
    // because the request methods take `&mut self`.
    fn client(&self) -> Client {
        self.client.clone()
    }

    async fn put_txn(&self, guard: Compare, key: &str, value: &[u8], lease: LeaseId) -> Result<bool> {
        let txn = Txn::new().when(vec![guard]).and_then(vec![TxnOp::put(
            key,
            value,
            Some(PutOptions::new().with_lease(lease.0)),
        )]);
        let resp = self.client().txn(txn).await?;
        Ok(resp.succeeded())
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.client().get(key, None).await?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<()> {
        let options = lease.map(|l| PutOptions::new().with_lease(l.0));
        self.client().put(key, value, options).await?;
        Ok(())
    }

    async fn create_if_absent(&self, key: &str, value: &[u8], lease: LeaseId) -> Result<bool> {
        // create_revision is 0 only for keys that do not exist
        let guard = Compare::create_revision(key, CompareOp::Equal, 0);
        let created = self.put_txn(guard, key, value, lease).await?;
        debug!("etcd create_if_absent {} -> {}", key, created);
        Ok(created)
    }

    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        lease: LeaseId,
    ) -> Result<bool> {
        let guard = Compare::value(key, CompareOp::Equal, expected);
        let replaced = self.put_txn(guard, key, value, lease).await?;
        debug!("etcd replace_if_equal {} -> {}", key, replaced);
        Ok(replaced)
    }

    async fn grant_lease(&self, ttl_seconds: u64) -> Result<LeaseId> {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .filter(|_| ttl_seconds <= MAX_LEASE_TTL_SECONDS)
            .ok_or(StoreError::LeaseTtlOutOfRange(ttl_seconds))?;
        let resp = self.client().lease_grant(ttl, None).await?;
        Ok(LeaseId(resp.id()))
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        self.client().lease_revoke(lease.0).await?;
        Ok(())
    }
}
