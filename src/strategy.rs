//! Selection strategies: picking one address out of a pool.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rand::Rng;

use crate::address::{Address, AddressPool};
use crate::error::{Error, Result};

/// The selection policy a load balancer is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Uniformly random pick on every call.
    Random,
    /// Cyclic pick with one cursor per service name.
    RoundRobin,
}

impl Strategy {
    /// Creates a fresh selector implementing this strategy.
    #[must_use]
    pub fn selector(self) -> Box<dyn Select> {
        match self {
            Self::Random => Box::new(RandomSelector),
            Self::RoundRobin => Box::new(RoundRobinSelector::new()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("random"),
            Self::RoundRobin => f.write_str("round-robin"),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown load balancing strategy {other:?}"
            ))),
        }
    }
}

/// Picks one address from a pool.
pub trait Select: Send + Sync + fmt::Debug {
    /// Returns an address from `pool` on behalf of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPool`] if the pool has no addresses.
    fn pick(&self, pool: &AddressPool, service: &str) -> Result<Address>;
}

/// Memoryless uniform selection.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl Select for RandomSelector {
    fn pick(&self, pool: &AddressPool, service: &str) -> Result<Address> {
        if pool.is_empty() {
            return Err(Error::empty_pool(service));
        }

        let index = rand::thread_rng().gen_range(0..pool.len());
        pool.get(index)
            .cloned()
            .ok_or_else(|| Error::empty_pool(service))
    }
}

/// Cyclic selection with an independent cursor per service name.
///
/// The cursor only ever increments; the index used is the cursor modulo the
/// current pool length, so pools may grow or shrink between picks.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursors: RwLock<HashMap<String, Arc<AtomicUsize>>>,
}

impl RoundRobinSelector {
    /// Creates a selector with no cursors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cursor for `service`, creating it at 0 on first use.
    fn cursor(&self, service: &str) -> Arc<AtomicUsize> {
        if let Some(cursor) = self.cursors.read().get(service) {
            return Arc::clone(cursor);
        }

        Arc::clone(
            self.cursors
                .write()
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(AtomicUsize::new(0))),
        )
    }
}

impl Select for RoundRobinSelector {
    fn pick(&self, pool: &AddressPool, service: &str) -> Result<Address> {
        if pool.is_empty() {
            return Err(Error::empty_pool(service));
        }

        let cursor = self.cursor(service).fetch_add(1, Ordering::Relaxed);
        pool.get(cursor % pool.len())
            .cloned()
            .ok_or_else(|| Error::empty_pool(service))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    fn pool(addrs: &[&str]) -> AddressPool {
        AddressPool::new(addrs.iter().map(|s| s.parse().unwrap()))
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    // Strategy parsing tests

    #[test]
    fn strategy_from_str() {
        assert_eq!("random".parse::<Strategy>().unwrap(), Strategy::Random);
        assert_eq!("Random".parse::<Strategy>().unwrap(), Strategy::Random);
        assert_eq!("round-robin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
        assert_eq!("round_robin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
        assert_eq!("RoundRobin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
    }

    #[test]
    fn strategy_from_str_unknown_is_invalid_configuration() {
        assert!(matches!(
            "least-connections".parse::<Strategy>(),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            "".parse::<Strategy>(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn strategy_display_round_trips() {
        for strategy in [Strategy::Random, Strategy::RoundRobin] {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
    }

    // Random tests

    #[test]
    fn random_empty_pool_fails() {
        let result = RandomSelector.pick(&pool(&[]), "web");
        assert_eq!(result, Err(Error::empty_pool("web")));
    }

    #[test]
    fn random_single_address() {
        let pool = pool(&["10.0.0.1:80"]);

        for _ in 0..10 {
            assert_eq!(RandomSelector.pick(&pool, "web").unwrap(), addr("10.0.0.1:80"));
        }
    }

    #[test]
    fn random_only_returns_pool_members() {
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);

        for _ in 0..1000 {
            let picked = RandomSelector.pick(&pool, "web").unwrap();
            assert!(pool.addresses().contains(&picked));
        }
    }

    #[test]
    fn random_eventually_covers_pool() {
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);

        let seen: HashSet<Address> = (0..1000)
            .map(|_| RandomSelector.pick(&pool, "web").unwrap())
            .collect();

        assert_eq!(seen.len(), 3);
    }

    // RoundRobin tests

    #[test]
    fn round_robin_empty_pool_fails() {
        let selector = RoundRobinSelector::new();
        assert_eq!(
            selector.pick(&pool(&[]), "web"),
            Err(Error::empty_pool("web"))
        );
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let selector = RoundRobinSelector::new();
        let pool = pool(&["a:80", "b:80", "c:80"]);

        let picks: Vec<Address> = (0..6)
            .map(|_| selector.pick(&pool, "web").unwrap())
            .collect();

        assert_eq!(
            picks,
            vec![
                addr("a:80"),
                addr("b:80"),
                addr("c:80"),
                addr("a:80"),
                addr("b:80"),
                addr("c:80"),
            ]
        );
    }

    #[test]
    fn round_robin_covers_pool_from_any_cursor() {
        let selector = RoundRobinSelector::new();
        let pool = pool(&["a:80", "b:80", "c:80", "d:80"]);

        for offset in 0..4 {
            // advance the cursor to an arbitrary starting point
            for _ in 0..offset {
                selector.pick(&pool, "web").unwrap();
            }

            let cycle: Vec<Address> = (0..4)
                .map(|_| selector.pick(&pool, "web").unwrap())
                .collect();

            let distinct: HashSet<&Address> = cycle.iter().collect();
            assert_eq!(distinct.len(), 4);

            assert_eq!(selector.pick(&pool, "web").unwrap(), cycle[0]);
        }
    }

    #[test]
    fn round_robin_cursors_are_per_service() {
        let selector = RoundRobinSelector::new();
        let pool = pool(&["a:80", "b:80"]);

        assert_eq!(selector.pick(&pool, "web").unwrap(), addr("a:80"));
        assert_eq!(selector.pick(&pool, "api").unwrap(), addr("a:80"));
        assert_eq!(selector.pick(&pool, "web").unwrap(), addr("b:80"));
        assert_eq!(selector.pick(&pool, "api").unwrap(), addr("b:80"));
    }

    #[test]
    fn round_robin_survives_shrinking_pool() {
        let selector = RoundRobinSelector::new();
        let large = pool(&["a:80", "b:80", "c:80", "d:80", "e:80"]);
        let small = pool(&["a:80", "b:80", "c:80"]);

        for _ in 0..4 {
            selector.pick(&large, "web").unwrap();
        }

        // cursor is 4, beyond the new pool length
        let picked = selector.pick(&small, "web").unwrap();
        assert!(small.addresses().contains(&picked));
        assert_eq!(picked, addr("b:80"));
    }

    #[test]
    fn round_robin_survives_growing_pool() {
        let selector = RoundRobinSelector::new();
        let small = pool(&["a:80", "b:80"]);
        let large = pool(&["a:80", "b:80", "c:80", "d:80"]);

        selector.pick(&small, "web").unwrap();
        selector.pick(&small, "web").unwrap();

        assert_eq!(selector.pick(&large, "web").unwrap(), addr("c:80"));
        assert_eq!(selector.pick(&large, "web").unwrap(), addr("d:80"));
    }

    #[test]
    fn round_robin_failed_pick_does_not_advance_cursor() {
        let selector = RoundRobinSelector::new();
        let pool_abc = pool(&["a:80", "b:80", "c:80"]);

        assert!(selector.pick(&pool(&[]), "web").is_err());
        assert_eq!(selector.pick(&pool_abc, "web").unwrap(), addr("a:80"));
    }

    #[test]
    fn round_robin_concurrent_picks_are_balanced() {
        let selector = Arc::new(RoundRobinSelector::new());
        let pool = Arc::new(pool(&["a:80", "b:80", "c:80", "d:80"]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = Arc::clone(&selector);
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    (0..100)
                        .map(|_| selector.pick(&pool, "web").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<Address, usize> = HashMap::new();
        for handle in handles {
            for picked in handle.join().unwrap() {
                *counts.entry(picked).or_insert(0) += 1;
            }
        }

        // 800 unique cursor values spread evenly over 4 addresses
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 200));
    }

    #[test]
    fn strategy_selector_matches_kind() {
        let pool = pool(&["a:80", "b:80"]);
        let selector = Strategy::RoundRobin.selector();

        assert_eq!(selector.pick(&pool, "web").unwrap(), addr("a:80"));
        assert_eq!(selector.pick(&pool, "web").unwrap(), addr("b:80"));

        let selector = Strategy::Random.selector();
        assert!(pool.addresses().contains(&selector.pick(&pool, "web").unwrap()));
    }
}
