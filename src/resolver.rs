//! The discovery capability consumed by the pool cache.

use std::collections::HashMap;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::address::Address;
use crate::error::{Error, Result, validate_service_name};

/// Resolves a service name to the addresses currently backing it.
///
/// Implementations are stateless I/O boundaries: no caching and no retries.
/// They report an empty service name as [`Error::InvalidInput`], zero records
/// as [`Error::NotFound`] and transport or protocol problems as
/// [`Error::ResolutionFailure`].
pub trait Resolve: Send + Sync {
    /// Looks up `service`.
    fn resolve<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<Address>>>;
}

/// A resolver answering from a fixed table.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    services: HashMap<String, Vec<Address>>,
}

impl StaticResolver {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the addresses for `service`, replacing any previous entry.
    #[must_use]
    pub fn service(
        mut self,
        service: impl Into<String>,
        addresses: impl IntoIterator<Item = Address>,
    ) -> Self {
        self.services
            .insert(service.into(), addresses.into_iter().collect());
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<Address>>> {
        let result = validate_service_name(service).and_then(|()| {
            match self.services.get(service) {
                Some(addresses) if !addresses.is_empty() => Ok(addresses.clone()),
                _ => Err(Error::not_found(service)),
            }
        });

        futures::future::ready(result).boxed()
    }
}
