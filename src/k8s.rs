//! Kubernetes endpoint discovery using `EndpointSlice` listings.
//!
//! Each resolution lists the `EndpointSlice` resources labelled with the
//! service name and returns the ready endpoint addresses on the configured
//! port. Nothing is watched or cached here; the pool cache decides how often
//! to list again.
//!
//! # Example
//!
//! ```ignore
//! use srv_clb::{CacheConfig, KubernetesConfig, KubernetesResolver, LoadBalancer, Strategy};
//!
//! let resolver = KubernetesResolver::try_default(KubernetesConfig::new(50051)).await?;
//! let lb = LoadBalancer::with_resolver(resolver, Strategy::RoundRobin, CacheConfig::default());
//!
//! let addr = lb.get_address("my-grpc-service").await?;
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::ListParams;
use kube::{Api, Client};

use crate::address::Address;
use crate::error::{Error, Result, validate_service_name};
use crate::resolver::Resolve;

/// Port specification for the discovered service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Port {
    /// A numeric port number.
    Number(u16),
    /// A named port (resolved from `EndpointSlice`).
    Name(String),
}

impl From<u16> for Port {
    fn from(port: u16) -> Self {
        Self::Number(port)
    }
}

impl From<&str> for Port {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Port {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Configuration for Kubernetes endpoint discovery.
#[derive(Clone, Debug)]
pub struct KubernetesConfig {
    /// The Kubernetes namespace to list `EndpointSlice`s in.
    /// If `None`, uses the current namespace from the kube client.
    pub namespace: Option<String>,

    /// The port to report for each endpoint (number or name).
    pub port: Port,
}

impl KubernetesConfig {
    /// Creates a new discovery configuration.
    ///
    /// The port can be specified as a number (`50051`) or a name (`"grpc"`).
    /// Uses the current namespace from the kube client configuration.
    #[must_use]
    pub fn new(port: impl Into<Port>) -> Self {
        Self {
            namespace: None,
            port: port.into(),
        }
    }

    /// Sets an explicit namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Resolves Kubernetes service names to ready endpoint addresses.
#[derive(Clone)]
pub struct KubernetesResolver {
    slices: Api<EndpointSlice>,
    port: Port,
}

impl std::fmt::Debug for KubernetesResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesResolver")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl KubernetesResolver {
    /// Creates a resolver using an existing kube client.
    #[must_use]
    pub fn new(client: Client, config: KubernetesConfig) -> Self {
        let namespace = config
            .namespace
            .unwrap_or_else(|| client.default_namespace().to_string());

        Self {
            slices: Api::namespaced(client, &namespace),
            port: config.port,
        }
    }

    /// Creates a resolver from the in-cluster or kubeconfig client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if no Kubernetes client
    /// configuration can be loaded.
    pub async fn try_default(config: KubernetesConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::InvalidConfiguration(format!("kubernetes client: {e}")))?;

        Ok(Self::new(client, config))
    }

    async fn list(&self, service: &str) -> Result<Vec<Address>> {
        validate_service_name(service)?;

        let params = ListParams::default().labels(&format!("kubernetes.io/service-name={service}"));

        tracing::debug!(service, port = ?self.port, "listing Kubernetes endpoint slices");

        let slices = self
            .slices
            .list(&params)
            .await
            .map_err(|e| Error::resolution_failure(service, e))?;

        let addresses = ready_addresses(slices.items.iter(), &self.port);

        if addresses.is_empty() {
            return Err(Error::not_found(service));
        }

        Ok(addresses)
    }
}

impl Resolve for KubernetesResolver {
    fn resolve<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<Address>>> {
        self.list(service).boxed()
    }
}

/// Collects the ready endpoints across `slices` in a stable order.
fn ready_addresses<'a>(
    slices: impl Iterator<Item = &'a EndpointSlice>,
    port: &Port,
) -> Vec<Address> {
    let mut addrs: Vec<SocketAddr> = slices
        .flat_map(|slice| extract_ready_endpoints(slice, port))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    addrs.sort();
    addrs.into_iter().map(Address::from).collect()
}

/// Extracts ready endpoint addresses from an `EndpointSlice`.
fn extract_ready_endpoints(slice: &EndpointSlice, port: &Port) -> HashSet<SocketAddr> {
    // Resolve the port number
    let port_number = match port {
        Port::Number(n) => Some(*n),
        Port::Name(name) => slice.ports.as_ref().and_then(|ports| {
            ports
                .iter()
                .find(|p| p.name.as_deref() == Some(name.as_str()))
                .and_then(|p| p.port)
                .and_then(|p| u16::try_from(p).ok())
        }),
    };

    let Some(port_number) = port_number.filter(|&n| n != 0) else {
        return HashSet::new();
    };

    let mut addrs = HashSet::new();

    for ep in &slice.endpoints {
        // An endpoint is ready if conditions.ready is true or unset (defaults to true)
        let ready = ep.conditions.as_ref().and_then(|c| c.ready).unwrap_or(true);

        if !ready {
            continue;
        }

        for addr in &ep.addresses {
            if let Ok(ip) = addr.parse::<IpAddr>() {
                addrs.insert(SocketAddr::new(ip, port_number));
            }
        }
    }

    addrs
}
