//! Answering resolution queries from the stored mapping.
//!
//! The responder is optional middleware in a larger resolution chain: it
//! answers only for names whose stored value decodes as a node identity and
//! declines everything else so the host framework can try its next handler.

use crate::identity::NodeIdentity;
use crate::pattern::normalize_name;
use serde::{Deserialize, Serialize};
use slotname_store::StoreClient;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

/// Requested record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    /// Any other type, carried as its numeric code
    Other(u16),
}

impl RecordType {
    /// Map a DNS type code.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            28 => RecordType::Aaaa,
            other => RecordType::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Aaaa => 28,
            RecordType::Other(code) => code,
        }
    }
}

/// Well-known mnemonics besides A and AAAA.
const MNEMONICS: &[(&str, u16)] = &[
    ("NS", 2),
    ("CNAME", 5),
    ("SOA", 6),
    ("PTR", 12),
    ("MX", 15),
    ("TXT", 16),
    ("SRV", 33),
    ("NAPTR", 35),
    ("DS", 43),
    ("RRSIG", 46),
    ("DNSKEY", 48),
    ("SVCB", 64),
    ("HTTPS", 65),
    ("AXFR", 252),
    ("ANY", 255),
    ("CAA", 257),
];

impl std::str::FromStr for RecordType {
    type Err = std::convert::Infallible;

    /// Accepts a mnemonic, `TYPE<n>` or a numeric type code. Anything
    /// unrecognized becomes `Other(0)`, which is never answered.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let parsed = match upper.as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            other => {
                let code = MNEMONICS
                    .iter()
                    .find(|(name, _)| *name == other)
                    .map(|&(_, code)| code)
                    .or_else(|| other.strip_prefix("TYPE").unwrap_or(other).parse().ok())
                    .unwrap_or(0);
                RecordType::from_code(code)
            }
        };
        Ok(parsed)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Other(code) => write!(f, "TYPE{}", code),
        }
    }
}

/// Record data for a synthesized answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AddressData {
    A { address: Ipv4Addr },
    #[serde(rename = "AAAA")]
    Aaaa { address: Ipv6Addr },
}

/// One answer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Owner name, as queried (normalized)
    pub name: String,
    /// Always IN
    pub class: u16,
    /// Answers are never cached; slots move between nodes
    pub ttl: u32,
    #[serde(flatten)]
    pub data: AddressData,
}

/// DNS class IN.
pub const CLASS_IN: u16 = 1;

/// Result of answering a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Records(Vec<AddressRecord>),
    /// Not ours to answer; defer to the fallback handler.
    PassThrough,
}

impl Answer {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Answer::PassThrough)
    }
}

/// Turns stored identities into answers. Read-only.
#[derive(Debug, Clone)]
pub struct QueryResponder {
    store: StoreClient,
}

impl QueryResponder {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Answer a query for `name`. Never fails: every problem is a pass-through.
    pub async fn answer(&self, name: &str, record_type: RecordType) -> Answer {
        let name = normalize_name(name);

        let stored = match self.store.get(&name).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Answer::PassThrough,
            Err(e) => {
                warn!("Store lookup for {} failed, passing through: {}", name, e);
                return Answer::PassThrough;
            }
        };

        let identity = match NodeIdentity::decode(&stored) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Value at {} is not a node identity: {}", name, e);
                return Answer::PassThrough;
            }
        };

        let data = match (record_type, identity.ipv4, identity.ipv6) {
            (RecordType::A, Some(address), _) => AddressData::A { address },
            (RecordType::Aaaa, _, Some(address)) => AddressData::Aaaa { address },
            _ => return Answer::PassThrough,
        };

        Answer::Records(vec![AddressRecord {
            name,
            class: CLASS_IN,
            ttl: 0,
            data,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotname_store::{CoordinationStore, MemoryStore, DEFAULT_TIMEOUT};
    use std::sync::Arc;

    async fn responder_with(entries: &[(&str, &[u8])]) -> (QueryResponder, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (key, value) in entries {
            store.put(key, value, None).await.unwrap();
        }
        let client = StoreClient::new(store.clone(), DEFAULT_TIMEOUT);
        (QueryResponder::new(client), store)
    }

    const DUAL: &[u8] = br#"{"ipv4":"10.0.0.5","ipv6":"fd00::5","port":53}"#;

    #[tokio::test]
    async fn answers_a_and_aaaa() {
        let (responder, _) = responder_with(&[("worker1.tf.local.", DUAL)]).await;

        let a = responder.answer("worker1.tf.local.", RecordType::A).await;
        assert_eq!(
            a,
            Answer::Records(vec![AddressRecord {
                name: "worker1.tf.local.".into(),
                class: CLASS_IN,
                ttl: 0,
                data: AddressData::A {
                    address: Ipv4Addr::new(10, 0, 0, 5)
                },
            }])
        );

        let aaaa = responder.answer("worker1.tf.local.", RecordType::Aaaa).await;
        match aaaa {
            Answer::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(
                    records[0].data,
                    AddressData::Aaaa {
                        address: "fd00::5".parse().unwrap()
                    }
                );
            }
            Answer::PassThrough => panic!("expected an AAAA record"),
        }
    }

    #[tokio::test]
    async fn query_names_are_normalized() {
        let (responder, _) = responder_with(&[("worker1.tf.local.", DUAL)]).await;
        let answer = responder.answer("Worker1.TF.local", RecordType::A).await;
        assert!(!answer.is_pass_through());
    }

    #[tokio::test]
    async fn unknown_name_passes_through() {
        let (responder, _) = responder_with(&[]).await;
        assert!(responder
            .answer("worker9.tf.local.", RecordType::A)
            .await
            .is_pass_through());
    }

    #[tokio::test]
    async fn missing_family_passes_through() {
        let (responder, _) =
            responder_with(&[("v4only.local.", &br#"{"ipv4":"10.0.0.5","port":53}"#[..])]).await;
        assert!(responder.answer("v4only.local.", RecordType::Aaaa).await.is_pass_through());
    }

    #[tokio::test]
    async fn other_types_pass_through() {
        let (responder, _) = responder_with(&[("worker1.tf.local.", DUAL)]).await;
        for t in [
            RecordType::from_code(16),
            RecordType::from_code(33),
            RecordType::Other(0),
        ] {
            assert!(responder.answer("worker1.tf.local.", t).await.is_pass_through());
        }
    }

    #[tokio::test]
    async fn foreign_values_pass_through() {
        let (responder, _) = responder_with(&[
            ("garbage.local.", &b"\xff\xfe"[..]),
            ("config.local.", &br#"{"ipv4":12}"#[..]),
        ])
        .await;
        assert!(responder.answer("garbage.local.", RecordType::A).await.is_pass_through());
        assert!(responder.answer("config.local.", RecordType::A).await.is_pass_through());
    }

    #[tokio::test]
    async fn store_outage_passes_through() {
        let (responder, store) = responder_with(&[("worker1.tf.local.", DUAL)]).await;
        store.set_available(false);
        assert!(responder.answer("worker1.tf.local.", RecordType::A).await.is_pass_through());
    }

    #[test]
    fn parses_record_types() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("AAAA".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!("28".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!("16".parse::<RecordType>().unwrap(), RecordType::Other(16));
        assert_eq!("TYPE28".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!("mx".parse::<RecordType>().unwrap(), RecordType::Other(15));
        assert_eq!("ANY".parse::<RecordType>().unwrap(), RecordType::Other(255));
        assert_eq!("BOGUS".parse::<RecordType>().unwrap(), RecordType::Other(0));
    }
}
