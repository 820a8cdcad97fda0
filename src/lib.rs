#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Client-side load balancing over service discovery.
//!
//! Given a logical service name, a [`LoadBalancer`] resolves the addresses
//! currently backing it and hands out one address per call, either at random
//! or round-robin. Discovery defaults to DNS SRV queries against a fixed name
//! server (such as a Consul agent); Kubernetes `EndpointSlice` discovery and
//! static tables are available through [`LoadBalancer::with_resolver`].
//!
//! # Features
//!
//! - **Lazy refresh**: pools are resolved on demand, with an optional TTL
//! - **Single flight**: concurrent callers for one service share a single resolution
//! - **Stale serving**: an optional grace window keeps the last pool alive
//!   through discovery outages
//! - **Per-service round robin**: each service name cycles independently
//!
//! # Usage
//!
//! ```no_run
//! use srv_clb::{LoadBalancer, Strategy};
//!
//! # async fn run() -> srv_clb::Result<()> {
//! // Consul's DNS interface
//! let lb = LoadBalancer::new("127.0.0.1", "8600", Strategy::RoundRobin)?;
//!
//! let addr = lb.get_address("web.service.consul").await?;
//! println!("sending request to {addr}");
//! # Ok(())
//! # }
//! ```

mod address;
mod balancer;
mod cache;
mod config;
mod dns;
mod error;
mod k8s;
mod resolver;
mod strategy;

pub use address::{Address, AddressPool};
pub use balancer::LoadBalancer;
pub use config::{CacheConfig, Config, DEFAULT_RESOLVE_TIMEOUT};
pub use dns::DnsResolver;
pub use error::{Error, Result};
pub use k8s::{KubernetesConfig, KubernetesResolver, Port};
pub use resolver::{Resolve, StaticResolver};
pub use strategy::{RandomSelector, RoundRobinSelector, Select, Strategy};
