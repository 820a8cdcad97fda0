//! Per-service address pool cache.
//!
//! The cache answers "give me a fresh-enough pool for this service" and owns
//! the decision of when to go back to the resolver.
//!
//! # How It Works
//!
//! 1. A cached pool younger than the TTL is returned as is
//! 2. Otherwise the caller starts a resolution, or joins the one already in
//!    flight for the same service
//! 3. A successful resolution replaces the pool wholesale
//! 4. A failed resolution falls back to the previous pool while it is within
//!    the stale grace window, and is returned to every waiter otherwise
//!
//! Locks guard only in-memory bookkeeping and are never held across an
//! `.await`, so a slow resolution for one service does not hold up another.
//! The in-flight slot only holds a weak handle: once every waiter has given
//! up on a resolution it is dropped, and the next caller starts a new one.
//! Services that have never resolved successfully are evicted after a failed
//! resolution, so names that only ever fail do not accumulate.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use parking_lot::{Mutex, RwLock};

use crate::address::AddressPool;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::resolver::Resolve;

/// A resolution shared by every caller that asked for the same service while it ran.
type Flight = Shared<BoxFuture<'static, Result<Arc<AddressPool>>>>;

/// Non-owning handle to a [`Flight`]; it cannot be upgraded once all waiters are gone.
type WeakFlight = WeakShared<BoxFuture<'static, Result<Arc<AddressPool>>>>;

/// Cached state for one service.
#[derive(Default)]
struct Entry {
    /// Last successfully resolved pool; `None` until the first success.
    pool: RwLock<Option<Arc<AddressPool>>>,

    /// The resolution currently in flight, if any.
    flight: Mutex<Option<WeakFlight>>,
}

impl Entry {
    fn current(&self) -> Option<Arc<AddressPool>> {
        self.pool.read().clone()
    }

    fn store(&self, pool: Arc<AddressPool>) {
        *self.pool.write() = Some(pool);
    }
}

/// Caches resolved pools by service name.
///
/// Service names reaching the cache have already been validated by
/// [`LoadBalancer`](crate::LoadBalancer).
pub struct PoolCache {
    resolver: Arc<dyn Resolve>,
    config: CacheConfig,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl std::fmt::Debug for PoolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCache")
            .field("config", &self.config)
            .field("services", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl PoolCache {
    /// Creates an empty cache in front of `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolve>, config: CacheConfig) -> Self {
        Self {
            resolver,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached pool for `service` without resolving.
    #[must_use]
    pub fn cached(&self, service: &str) -> Option<Arc<AddressPool>> {
        self.entries.read().get(service).and_then(|entry| entry.current())
    }

    /// Returns a pool for `service` that satisfies the freshness policy.
    ///
    /// The service name is expected to be validated by the caller; an empty
    /// name is passed through to the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::ResolutionFailure`] when
    /// resolution fails and no pool within the stale grace window exists, and
    /// any other error the resolver reports.
    pub async fn get_pool(&self, service: &str) -> Result<Arc<AddressPool>> {
        let entry = self.entry(service);

        if let Some(pool) = entry.current()
            && pool.age() < self.config.ttl
        {
            return Ok(pool);
        }

        let flight = self.flight(service, &entry);
        drop(entry);

        let outcome = flight.await;

        if outcome.is_err() {
            self.evict_unresolved(service);
        }

        outcome
    }

    /// Returns the entry for `service`, creating it on first use.
    fn entry(&self, service: &str) -> Arc<Entry> {
        if let Some(entry) = self.entries.read().get(service) {
            return Arc::clone(entry);
        }

        Arc::clone(self.entries.write().entry(service.to_string()).or_default())
    }

    /// Drops the entry for `service` if it never resolved and nobody else holds it.
    ///
    /// New handles to an entry are only taken under the map lock, so a strong
    /// count of one under the write lock means no caller or flight can still use it.
    fn evict_unresolved(&self, service: &str) {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get(service)
            && Arc::strong_count(entry) == 1
            && entry.current().is_none()
        {
            tracing::debug!(service, "evicting unresolved service");
            entries.remove(service);
        }
    }

    /// Joins the resolution in flight for `service`, starting one if there is none.
    ///
    /// A resolution every waiter has abandoned no longer upgrades and is replaced.
    fn flight(&self, service: &str, entry: &Arc<Entry>) -> Flight {
        let mut flight = entry.flight.lock();

        if let Some(existing) = flight.as_ref().and_then(WeakShared::upgrade) {
            tracing::debug!(service, "joining in-flight resolution");
            return existing;
        }

        let started = self.refresh(service.to_string(), Arc::clone(entry));
        *flight = started.downgrade();
        started
    }

    /// Builds the shared resolution future for `service`.
    ///
    /// The future records its own outcome in `entry` and clears the in-flight
    /// slot, so whichever waiter polls it to completion finishes the bookkeeping.
    fn refresh(&self, service: String, entry: Arc<Entry>) -> Flight {
        let resolver = Arc::clone(&self.resolver);
        let config = self.config.clone();

        async move {
            tracing::debug!(service = %service, "resolving service");

            let resolved =
                match tokio::time::timeout(config.resolve_timeout, resolver.resolve(&service))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::resolution_failure(
                        &service,
                        format!("timed out after {:?}", config.resolve_timeout),
                    )),
                };

            let outcome = match resolved {
                Ok(addresses) => {
                    let pool = AddressPool::new(addresses);

                    if pool.is_empty() {
                        Err(Error::not_found(&service))
                    } else {
                        tracing::debug!(
                            service = %service,
                            count = pool.len(),
                            "resolved service"
                        );
                        let pool = Arc::new(pool);
                        entry.store(Arc::clone(&pool));
                        Ok(pool)
                    }
                }

                Err(e) => Err(e),
            };

            let outcome = match outcome {
                Err(e) if e.is_discovery_failure() => {
                    serve_stale(&service, &entry, &config).ok_or(e)
                }

                other => other,
            };

            *entry.flight.lock() = None;
            outcome
        }
        .boxed()
        .shared()
    }
}

/// Returns the previous pool for `service` if it is within the grace window.
fn serve_stale(service: &str, entry: &Entry, config: &CacheConfig) -> Option<Arc<AddressPool>> {
    let grace = config.stale_grace?;
    let pool = entry.current()?;

    if pool.age() > grace {
        tracing::warn!(
            service,
            age = ?pool.age(),
            "resolution failed and cached pool is past its grace window"
        );

        return None;
    }

    tracing::warn!(
        service,
        age = ?pool.age(),
        count = pool.len(),
        "resolution failed, serving stale pool"
    );

    Some(pool)
}
