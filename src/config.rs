//! Load balancer configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default time allowed for a single resolution.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Freshness policy for cached address pools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a resolved pool is served before it is resolved again.
    /// Zero resolves on every call.
    pub ttl: Duration,

    /// How old a pool may be and still stand in for a failed resolution.
    /// `None` propagates discovery failures immediately.
    pub stale_grace: Option<Duration>,

    /// Upper bound on a single resolution.
    pub resolve_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            stale_grace: None,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Sets the pool time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enables serving a stale pool for up to `grace` after its last refresh.
    #[must_use]
    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = Some(grace);
        self
    }

    /// Sets the resolution timeout.
    #[must_use]
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }
}

/// Configuration for a load balancer backed by DNS SRV discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The DNS server answering SRV queries (for example a Consul agent on port 8600).
    pub discovery: SocketAddr,

    /// Pool freshness policy.
    pub cache: CacheConfig,
}

impl Config {
    /// Creates a configuration for the discovery endpoint at `address`:`port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `address` is not an IP
    /// address or `port` is not a number in 1–65535.
    pub fn new(address: &str, port: &str) -> Result<Self> {
        let ip = address.trim().parse::<IpAddr>().map_err(|e| {
            Error::InvalidConfiguration(format!("discovery address {address:?}: {e}"))
        })?;

        let port = match port.trim().parse::<u16>() {
            Ok(0) => {
                return Err(Error::InvalidConfiguration(
                    "discovery port must not be 0".into(),
                ));
            }
            Ok(port) => port,
            Err(e) => {
                return Err(Error::InvalidConfiguration(format!(
                    "discovery port {port:?}: {e}"
                )));
            }
        };

        Ok(Self {
            discovery: SocketAddr::new(ip, port),
            cache: CacheConfig::default(),
        })
    }

    /// Sets the pool time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cache = self.cache.ttl(ttl);
        self
    }

    /// Enables serving a stale pool for up to `grace` after its last refresh.
    #[must_use]
    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.cache = self.cache.stale_grace(grace);
        self
    }

    /// Sets the resolution timeout.
    #[must_use]
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.cache = self.cache.resolve_timeout(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_config_defaults() {
        let config = CacheConfig::default();

        assert_eq!(config.ttl, Duration::ZERO);
        assert!(config.stale_grace.is_none());
        assert_eq!(config.resolve_timeout, DEFAULT_RESOLVE_TIMEOUT);
    }

    #[test]
    fn cache_config_custom() {
        let config = CacheConfig::default()
            .ttl(Duration::from_secs(30))
            .stale_grace(Duration::from_secs(120))
            .resolve_timeout(Duration::from_millis(500));

        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.stale_grace, Some(Duration::from_secs(120)));
        assert_eq!(config.resolve_timeout, Duration::from_millis(500));
    }

    #[test]
    fn config_new_parses_endpoint() {
        let config = Config::new("127.0.0.1", "8600").unwrap();

        assert_eq!(config.discovery, "127.0.0.1:8600".parse().unwrap());
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn config_new_accepts_ipv6() {
        let config = Config::new("::1", "53").unwrap();
        assert_eq!(config.discovery, "[::1]:53".parse().unwrap());
    }

    #[test]
    fn config_new_rejects_bad_address() {
        assert!(matches!(
            Config::new("consul.local", "8600"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Config::new("", "8600"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn config_new_rejects_bad_port() {
        assert!(matches!(
            Config::new("127.0.0.1", "dns"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Config::new("127.0.0.1", "70000"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Config::new("127.0.0.1", "0"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn config_setters_forward_to_cache() {
        let config = Config::new("127.0.0.1", "8600")
            .unwrap()
            .ttl(Duration::from_secs(10))
            .stale_grace(Duration::from_secs(60))
            .resolve_timeout(Duration::from_secs(1));

        assert_eq!(config.cache.ttl, Duration::from_secs(10));
        assert_eq!(config.cache.stale_grace, Some(Duration::from_secs(60)));
        assert_eq!(config.cache.resolve_timeout, Duration::from_secs(1));
    }
}
