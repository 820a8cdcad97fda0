//! The load balancer facade.

use std::sync::Arc;

use crate::address::{Address, AddressPool};
use crate::cache::PoolCache;
use crate::config::{CacheConfig, Config};
use crate::dns::DnsResolver;
use crate::error::{Result, validate_service_name};
use crate::resolver::Resolve;
use crate::strategy::{Select, Strategy};

/// Resolves service names to a single address per call.
///
/// All service names share one pool cache and one selector, keyed
/// independently. The strategy is fixed at construction.
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: Strategy,
    cache: PoolCache,
    selector: Box<dyn Select>,
}

impl LoadBalancer {
    /// Creates a load balancer that discovers services through the DNS server
    /// at `discovery_address`:`discovery_port`, with default cache settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// if the address or port cannot be parsed.
    pub fn new(discovery_address: &str, discovery_port: &str, strategy: Strategy) -> Result<Self> {
        let config = Config::new(discovery_address, discovery_port)?;
        Ok(Self::from_config(config, strategy))
    }

    /// Creates a DNS SRV backed load balancer from a full configuration.
    #[must_use]
    pub fn from_config(config: Config, strategy: Strategy) -> Self {
        let resolver = DnsResolver::new(config.discovery, config.cache.resolve_timeout);
        Self::with_resolver(resolver, strategy, config.cache)
    }

    /// Creates a load balancer on top of any resolver.
    #[must_use]
    pub fn with_resolver(
        resolver: impl Resolve + 'static,
        strategy: Strategy,
        cache: CacheConfig,
    ) -> Self {
        tracing::debug!(%strategy, ?cache, "creating load balancer");

        Self {
            strategy,
            cache: PoolCache::new(Arc::new(resolver), cache),
            selector: strategy.selector(),
        }
    }

    /// Returns the selection strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Returns the cached pool for `service`, if one has been resolved.
    #[must_use]
    pub fn pool(&self, service: &str) -> Option<Arc<AddressPool>> {
        self.cache.cached(service)
    }

    /// Returns one address for `service`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`](crate::Error::InvalidInput) if `service` is empty
    /// - [`Error::NotFound`](crate::Error::NotFound) if discovery found no addresses
    /// - [`Error::ResolutionFailure`](crate::Error::ResolutionFailure) if discovery failed
    /// - [`Error::EmptyPool`](crate::Error::EmptyPool) if the selector received no addresses
    pub async fn get_address(&self, service: &str) -> Result<Address> {
        validate_service_name(service)?;

        let pool = self.cache.get_pool(service).await?;
        let address = self.selector.pick(&pool, service)?;

        tracing::trace!(service, %address, "selected address");

        Ok(address)
    }
}
