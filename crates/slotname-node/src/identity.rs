//! Node identity: the address a claimed name resolves to.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// Reachable address of the node holding a slot.
///
/// Stored in the coordination store as JSON, e.g.
/// `{"ipv4":"10.0.0.5","port":53}`. Absent address families are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

impl NodeIdentity {
    pub fn new(ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>, port: u16) -> Self {
        Self { ipv4, ipv6, port }
    }

    /// Serialize to the stored byte form. Output is deterministic, so two
    /// encodings of equal identities compare equal byte for byte.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a stored value.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }

    /// Work out this node's identity.
    ///
    /// Explicit addresses win. Otherwise each family is probed by asking the
    /// OS which local address it would route external traffic from; no
    /// packets are sent. Without a route, the first non-loopback interface
    /// address of that family is used.
    pub async fn discover(
        port: u16,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<Self> {
        let ipv4 = match ipv4 {
            Some(addr) => Some(addr),
            None => first_ipv4(probe_route(PROBE_V4).await),
        };
        let ipv6 = match ipv6 {
            Some(addr) => Some(addr),
            None => first_ipv6(probe_route(PROBE_V6).await),
        };

        let (ipv4, ipv6) = if ipv4.is_none() || ipv6.is_none() {
            let listed = interfaces::addresses().unwrap_or_else(|e| {
                debug!("Failed to list interfaces: {}", e);
                Vec::new()
            });
            (
                ipv4.or_else(|| first_ipv4(listed.iter().copied())),
                ipv6.or_else(|| first_ipv6(listed)),
            )
        } else {
            (ipv4, ipv6)
        };

        if ipv4.is_none() && ipv6.is_none() {
            return Err(Error::Configuration(
                "could not find a non-loopback address; set SLOTNAME_IPV4 or SLOTNAME_IPV6".into(),
            ));
        }
        Ok(Self { ipv4, ipv6, port })
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ipv4 = self.ipv4.map(|a| a.to_string()).unwrap_or_else(|| "-".into());
        let ipv6 = self.ipv6.map(|a| a.to_string()).unwrap_or_else(|| "-".into());
        write!(f, "ipv4={} ipv6={} port={}", ipv4, ipv6, self.port)
    }
}

// Documentation ranges (RFC 5737 / RFC 3849): routable, never answered.
const PROBE_V4: &str = "192.0.2.1:53";
const PROBE_V6: &str = "[2001:db8::1]:53";

async fn probe_route(target: &str) -> Option<IpAddr> {
    let target: SocketAddr = target.parse().ok()?;
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await.ok()?;
    if let Err(e) = socket.connect(target).await {
        debug!("No route for {}: {}", target, e);
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}

fn first_ipv4(candidates: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    candidates.into_iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    })
}

/// Link-local addresses need a scope to be reachable, so they never qualify.
fn first_ipv6(candidates: impl IntoIterator<Item = IpAddr>) -> Option<Ipv6Addr> {
    candidates.into_iter().find_map(|ip| match ip {
        IpAddr::V6(v6)
            if !v6.is_loopback()
                && !v6.is_unspecified()
                && (v6.segments()[0] & 0xffc0) != 0xfe80 =>
        {
            Some(v6)
        }
        _ => None,
    })
}

mod interfaces {
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    /// Addresses of every configured interface, in the order the OS lists them.
    pub fn addresses() -> io::Result<Vec<IpAddr>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut found = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // SAFETY: the list stays valid until freeifaddrs below
            let entry = unsafe { &*cursor };
            if !entry.ifa_addr.is_null() {
                let family = libc::c_int::from(unsafe { (*entry.ifa_addr).sa_family });
                if family == libc::AF_INET {
                    let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
                    found.push(IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))));
                } else if family == libc::AF_INET6 {
                    let sin6 = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
                    found.push(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)));
                }
            }
            cursor = entry.ifa_next;
        }

        unsafe { libc::freeifaddrs(head) };
        Ok(found)
    }
}

/// Older records store the port as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) if text.is_empty() => Ok(0),
        Port::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_only_present_families() {
        let identity = NodeIdentity::new(Some(Ipv4Addr::new(10, 0, 0, 5)), None, 53);
        let encoded = String::from_utf8(identity.encode().unwrap()).unwrap();
        assert_eq!(encoded, r#"{"ipv4":"10.0.0.5","port":53}"#);
    }

    #[test]
    fn encoding_is_stable() {
        let identity = NodeIdentity::new(
            Some(Ipv4Addr::new(10, 0, 0, 5)),
            Some("fe80::1".parse().unwrap()),
            1053,
        );
        assert_eq!(identity.encode().unwrap(), identity.clone().encode().unwrap());
        assert_eq!(NodeIdentity::decode(&identity.encode().unwrap()).unwrap(), identity);
    }

    #[test]
    fn decodes_string_port_records() {
        let identity =
            NodeIdentity::decode(br#"{"ipv4":"172.17.0.2","ipv6":"fe80::42","port":"1053"}"#)
                .unwrap();
        assert_eq!(identity.ipv4, Some(Ipv4Addr::new(172, 17, 0, 2)));
        assert_eq!(identity.port, 1053);
    }

    #[test]
    fn rejects_foreign_values() {
        assert!(matches!(NodeIdentity::decode(b"not json"), Err(Error::Decode(_))));
        assert!(matches!(
            NodeIdentity::decode(br#"{"ipv4":"not-an-ip"}"#),
            Err(Error::Decode(_))
        ));
        assert!(matches!(NodeIdentity::decode(b"42"), Err(Error::Decode(_))));
    }

    #[test]
    fn interface_fallback_skips_unusable_addresses() {
        let candidates: Vec<IpAddr> = vec![
            "127.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
            "fe80::1".parse().unwrap(),
            "10.0.0.3".parse().unwrap(),
            "fd00::3".parse().unwrap(),
            "10.0.0.4".parse().unwrap(),
        ];
        assert_eq!(first_ipv4(candidates.clone()), Some(Ipv4Addr::new(10, 0, 0, 3)));
        assert_eq!(first_ipv6(candidates), Some("fd00::3".parse().unwrap()));
        assert_eq!(first_ipv4(vec!["0.0.0.0".parse::<IpAddr>().unwrap()]), None);
    }

    #[test]
    fn lists_interface_addresses() {
        // Every host running the tests has at least a loopback interface
        let addrs = interfaces::addresses().unwrap();
        assert!(addrs.iter().any(|ip| ip.is_loopback()));
    }

    #[tokio::test]
    async fn explicit_addresses_skip_probing() {
        let v4 = Ipv4Addr::new(10, 1, 2, 3);
        let identity = NodeIdentity::discover(53, Some(v4), None).await.unwrap();
        assert_eq!(identity.ipv4, Some(v4));
        assert_eq!(identity.port, 53);
    }
}
