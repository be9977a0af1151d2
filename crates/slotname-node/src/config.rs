//! Node configuration.

use crate::error::{Error, Result};
use crate::pattern::NamePattern;
use slotname_store::{DEFAULT_TIMEOUT, MAX_LEASE_TTL_SECONDS};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:2379";
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_TTL_SECONDS: u64 = 20;
pub const DEFAULT_PORT: u16 = 53;

/// Cluster-wide settings. Every node in a fleet runs with the same values.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Coordination store endpoints
    pub endpoints: Vec<String>,

    /// Template producing a name from an ordinal
    pub pattern: NamePattern,

    /// Number of ordinals in the pool
    pub limit: u32,

    /// Lease lifetime for a claim
    pub ttl_seconds: u64,
}

impl ClusterConfig {
    /// Cluster config with default endpoint, limit and TTL.
    pub fn new(pattern: NamePattern) -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            pattern,
            limit: DEFAULT_LIMIT,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Check the invariants the negotiator and lease keeper rely on.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::Configuration("at least one store endpoint is required".into()));
        }
        if self.limit == 0 {
            return Err(Error::Configuration("limit must be a positive integer".into()));
        }
        if self.ttl_seconds == 0 {
            return Err(Error::Configuration("ttl must be a positive number of seconds".into()));
        }
        if self.ttl_seconds > MAX_LEASE_TTL_SECONDS {
            return Err(Error::Configuration(format!(
                "ttl must be at most {} seconds",
                MAX_LEASE_TTL_SECONDS
            )));
        }
        Ok(())
    }

    /// Interval between renewals: half the TTL.
    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.ttl_seconds.saturating_mul(500))
    }
}

/// Which coordination store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Etcd,
    /// Process-local store; only useful for a single node.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "etcd" => Ok(StoreBackend::Etcd),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Configuration(format!(
                "unknown store backend '{}', expected 'etcd' or 'memory'",
                other
            ))),
        }
    }
}

/// Configuration for a single node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub cluster: ClusterConfig,

    /// Port advertised alongside the node's addresses
    pub port: u16,

    /// Explicit IPv4 address (skips discovery)
    pub ipv4: Option<Ipv4Addr>,

    /// Explicit IPv6 address (skips discovery)
    pub ipv6: Option<Ipv6Addr>,

    pub backend: StoreBackend,

    /// Per-call store timeout
    pub store_timeout: Duration,

    /// Resolve socket path
    pub socket_path: PathBuf,
}

impl NodeConfig {
    pub fn new(cluster: ClusterConfig) -> Self {
        Self {
            cluster,
            port: DEFAULT_PORT,
            ipv4: None,
            ipv6: None,
            backend: StoreBackend::Etcd,
            store_timeout: DEFAULT_TIMEOUT,
            socket_path: PathBuf::from("./slotname.sock"),
        }
    }

    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pattern = var("SLOTNAME_PATTERN")
            .ok_or_else(|| Error::Configuration("SLOTNAME_PATTERN is required".into()))?;
        let pattern = NamePattern::parse(pattern.trim())?;

        let mut cluster = ClusterConfig::new(pattern);
        if let Some(endpoints) = var("SLOTNAME_ENDPOINTS") {
            cluster.endpoints = endpoints
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(limit) = var("SLOTNAME_LIMIT") {
            cluster.limit = parse_number("SLOTNAME_LIMIT", &limit)?;
        }
        if let Some(ttl) = var("SLOTNAME_TTL") {
            cluster.ttl_seconds = parse_number("SLOTNAME_TTL", &ttl)?;
        }

        let mut config = Self::new(cluster);
        if let Some(port) = var("SLOTNAME_PORT") {
            config.port = parse_number("SLOTNAME_PORT", &port)?;
        }
        if let Some(ipv4) = var("SLOTNAME_IPV4") {
            config.ipv4 = Some(parse_number("SLOTNAME_IPV4", &ipv4)?);
        }
        if let Some(ipv6) = var("SLOTNAME_IPV6") {
            config.ipv6 = Some(parse_number("SLOTNAME_IPV6", &ipv6)?);
        }
        if let Some(backend) = var("SLOTNAME_STORE") {
            config.backend = backend.parse()?;
        }
        if let Some(ms) = var("SLOTNAME_STORE_TIMEOUT_MS") {
            let ms: u64 = parse_number("SLOTNAME_STORE_TIMEOUT_MS", &ms)?;
            config.store_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = var("SLOTNAME_SOCKET") {
            config.socket_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        if self.store_timeout.is_zero() {
            return Err(Error::Configuration("store timeout must be positive".into()));
        }
        Ok(())
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid {} '{}': {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config =
            NodeConfig::from_lookup(lookup(&[("SLOTNAME_PATTERN", "worker{{ordinal}}.tf.local.")]))
                .unwrap();
        assert_eq!(config.cluster.endpoints, vec![DEFAULT_ENDPOINT.to_string()]);
        assert_eq!(config.cluster.limit, 10);
        assert_eq!(config.cluster.ttl_seconds, 20);
        assert_eq!(config.port, 53);
        assert_eq!(config.backend, StoreBackend::Etcd);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_every_variable() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("SLOTNAME_PATTERN", "w{{ordinal}}.local."),
            ("SLOTNAME_ENDPOINTS", "http://e1:2379, http://e2:2379,"),
            ("SLOTNAME_LIMIT", "5"),
            ("SLOTNAME_TTL", "8"),
            ("SLOTNAME_PORT", "1053"),
            ("SLOTNAME_IPV4", "10.0.0.7"),
            ("SLOTNAME_STORE", "memory"),
            ("SLOTNAME_STORE_TIMEOUT_MS", "250"),
            ("SLOTNAME_SOCKET", "/tmp/s.sock"),
        ]))
        .unwrap();
        assert_eq!(config.cluster.endpoints, vec!["http://e1:2379", "http://e2:2379"]);
        assert_eq!(config.cluster.limit, 5);
        assert_eq!(config.cluster.renew_interval(), Duration::from_secs(4));
        assert_eq!(config.port, 1053);
        assert_eq!(config.ipv4, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/s.sock"));
    }

    #[test]
    fn missing_pattern_is_fatal() {
        let err = NodeConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn malformed_values_are_fatal() {
        let base = ("SLOTNAME_PATTERN", "w{{ordinal}}.local.");
        for bad in [
            ("SLOTNAME_LIMIT", "0"),
            ("SLOTNAME_LIMIT", "ten"),
            ("SLOTNAME_TTL", "0"),
            ("SLOTNAME_TTL", "9000000001"),
            ("SLOTNAME_TTL", "18446744073709551615"),
            ("SLOTNAME_ENDPOINTS", " , "),
            ("SLOTNAME_STORE", "zookeeper"),
        ] {
            assert!(
                NodeConfig::from_lookup(lookup(&[base, bad])).is_err(),
                "{:?} should be rejected",
                bad
            );
        }
        let err = NodeConfig::from_lookup(lookup(&[("SLOTNAME_PATTERN", "fixed.local.")]))
            .unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn renew_interval_is_half_ttl() {
        let pattern = NamePattern::parse("w{{ordinal}}.local.").unwrap();
        assert_eq!(
            ClusterConfig::new(pattern.clone()).renew_interval(),
            Duration::from_secs(10)
        );
        assert_eq!(
            ClusterConfig::new(pattern).with_ttl(1).renew_interval(),
            Duration::from_millis(500)
        );
    }
}
