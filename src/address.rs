//! Resolved endpoints and the pools that hold them.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// A resolved network endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    /// Creates an address from a host and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the host is empty or the port is 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();

        if host.is_empty() {
            return Err(Error::InvalidInput("address host must not be empty".into()));
        }

        if port == 0 {
            return Err(Error::InvalidInput(format!("address {host} has port 0")));
        }

        Ok(Self { host, port })
    }

    /// Returns the host name or IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the address as a `SocketAddr` when the host is an IP literal.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parses `host:port` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Self::new(addr.ip().to_string(), addr.port());
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("address {s:?} has no port")))?;

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidInput(format!("address {s:?} has invalid port: {e}")))?;

        Self::new(host, port)
    }
}

/// The addresses currently believed live for one service.
///
/// A pool is an immutable snapshot: refreshing a service replaces its pool
/// with a new one instead of editing the existing value.
#[derive(Clone, Debug)]
pub struct AddressPool {
    addresses: Vec<Address>,
    refreshed_at: Instant,
}

impl AddressPool {
    /// Creates a pool stamped with the current time.
    ///
    /// Duplicates are dropped; the first occurrence keeps its position.
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut seen = HashSet::new();
        let addresses = addresses
            .into_iter()
            .filter(|addr| seen.insert(addr.clone()))
            .collect();

        Self {
            addresses,
            refreshed_at: Instant::now(),
        }
    }

    /// Returns the addresses in resolution order.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Returns the number of addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` if the pool holds no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Returns the address at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Address> {
        self.addresses.get(index)
    }

    /// Returns when the pool was resolved.
    #[must_use]
    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }

    /// Returns how long ago the pool was resolved.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.refreshed_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(host: &str, port: u16) -> Address {
        Address::new(host, port).unwrap()
    }

    #[test]
    fn new_rejects_empty_host() {
        assert!(matches!(Address::new("", 80), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn new_rejects_port_zero() {
        assert!(matches!(
            Address::new("10.0.0.1", 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn equality_is_by_host_and_port() {
        assert_eq!(addr("a", 80), addr("a", 80));
        assert_ne!(addr("a", 80), addr("a", 81));
        assert_ne!(addr("a", 80), addr("b", 80));
    }

    #[test]
    fn display_formats_host_and_port() {
        assert_eq!(addr("10.0.0.1", 8080).to_string(), "10.0.0.1:8080");
        assert_eq!(addr("web.node.consul", 80).to_string(), "web.node.consul:80");
        assert_eq!(addr("2001:db8::1", 443).to_string(), "[2001:db8::1]:443");
    }

    #[test]
    fn parse_host_and_port() {
        let parsed: Address = "web.node.consul:8500".parse().unwrap();
        assert_eq!(parsed, addr("web.node.consul", 8500));
    }

    #[test]
    fn parse_ipv6() {
        let parsed: Address = "[::1]:50051".parse().unwrap();
        assert_eq!(parsed, addr("::1", 50051));
        assert_eq!(parsed.socket_addr(), Some("[::1]:50051".parse().unwrap()));
    }

    #[test]
    fn parse_rejects_missing_or_bad_port() {
        assert!("web.node.consul".parse::<Address>().is_err());
        assert!("web.node.consul:http".parse::<Address>().is_err());
        assert!("web.node.consul:0".parse::<Address>().is_err());
        assert!(":80".parse::<Address>().is_err());
    }

    #[test]
    fn from_socket_addr() {
        let socket: SocketAddr = "10.0.0.1:50051".parse().unwrap();
        let address = Address::from(socket);

        assert_eq!(address.host(), "10.0.0.1");
        assert_eq!(address.port(), 50051);
        assert_eq!(address.socket_addr(), Some(socket));
    }

    #[test]
    fn socket_addr_is_none_for_host_names() {
        assert!(addr("web.node.consul", 80).socket_addr().is_none());
    }

    #[test]
    fn pool_deduplicates_preserving_order() {
        let pool = AddressPool::new(vec![
            addr("b", 80),
            addr("a", 80),
            addr("b", 80),
            addr("c", 80),
        ]);

        assert_eq!(
            pool.addresses(),
            &[addr("b", 80), addr("a", 80), addr("c", 80)]
        );
        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
    }

    #[test]
    fn empty_pool() {
        let pool = AddressPool::new(Vec::new());
        assert!(pool.is_empty());
        assert!(pool.get(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pool_age_tracks_time() {
        let pool = AddressPool::new(vec![addr("a", 80)]);
        tokio::time::advance(Duration::from_secs(7)).await;

        assert_eq!(pool.age(), Duration::from_secs(7));
    }
}
