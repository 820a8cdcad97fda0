//! DNS SRV discovery against a fixed name server.
//!
//! Queries SRV records for the service name at the configured discovery
//! endpoint, which is typically a Consul agent's DNS interface
//! (`web.service.consul` on port 8600). Consul answers SRV queries with A/AAAA
//! glue records in the additional section; those are used to turn each SRV
//! target into an IP address. Targets without glue keep their host name.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{Name, RData, Record};
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{ResolveError, Resolver};

use crate::address::Address;
use crate::error::{Error, Result, validate_service_name};
use crate::resolver::Resolve;

/// Resolves services through DNS SRV records.
#[derive(Clone)]
pub struct DnsResolver {
    server: SocketAddr,
    resolver: Resolver<TokioConnectionProvider>,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl DnsResolver {
    /// Creates a resolver that sends every query to `server`.
    ///
    /// Answers are not cached and each query is attempted once within
    /// `timeout`; freshness and failure policy belong to the pool cache.
    #[must_use]
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(server, Protocol::Udp));
        config.add_name_server(NameServerConfig::new(server, Protocol::Tcp));

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();

        Self { server, resolver }
    }

    /// Returns the name server this resolver queries.
    #[must_use]
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    async fn lookup(&self, service: &str) -> Result<Vec<Address>> {
        validate_service_name(service)?;

        tracing::debug!(service, server = %self.server, "querying SRV records");

        let lookup = self
            .resolver
            .srv_lookup(service)
            .await
            .map_err(|e| classify(service, &e))?;

        let targets: Vec<(Name, u16)> = lookup
            .iter()
            .map(|srv| (srv.target().clone(), srv.port()))
            .collect();

        let glue = glue_records(lookup.as_lookup().records());
        let addresses = collect_addresses(&targets, &glue);

        if addresses.is_empty() {
            return Err(Error::not_found(service));
        }

        Ok(addresses)
    }
}

impl Resolve for DnsResolver {
    fn resolve<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<Address>>> {
        self.lookup(service).boxed()
    }
}

/// Maps a hickory error onto the resolver error taxonomy.
fn classify(service: &str, error: &ResolveError) -> Error {
    if error.is_no_records_found() || error.is_nx_domain() {
        Error::not_found(service)
    } else {
        Error::resolution_failure(service, error)
    }
}

/// Indexes the A/AAAA records of a response by owner name.
fn glue_records(records: &[Record]) -> HashMap<Name, IpAddr> {
    let mut glue = HashMap::new();

    for record in records {
        let ip = match record.data() {
            RData::A(a) => IpAddr::V4(a.0),
            RData::AAAA(aaaa) => IpAddr::V6(aaaa.0),
            _ => continue,
        };

        glue.entry(record.name().to_lowercase()).or_insert(ip);
    }

    glue
}

/// Turns SRV targets into addresses, preferring glue IPs over host names.
///
/// Targets with port 0 or an empty name are skipped; duplicates are dropped.
fn collect_addresses(targets: &[(Name, u16)], glue: &HashMap<Name, IpAddr>) -> Vec<Address> {
    let mut addresses: Vec<Address> = Vec::with_capacity(targets.len());

    for (target, port) in targets {
        let host = match glue.get(&target.to_lowercase()) {
            Some(ip) => ip.to_string(),
            None => target.to_utf8().trim_end_matches('.').to_string(),
        };

        match Address::new(host, *port) {
            Ok(addr) if !addresses.contains(&addr) => addresses.push(addr),
            Ok(_) => {}
            Err(e) => tracing::debug!("skipping SRV target {target}: {e}"),
        }
    }

    addresses
}
