//! Resolves a service repeatedly and reports how picks were spread.
//!
//! # Environment Variables
//!
//! - `DISCOVERY_ADDRESS`: DNS server address (default: 127.0.0.1)
//! - `DISCOVERY_PORT`: DNS server port (default: 8600, Consul's DNS port)
//! - `SERVICE_NAME`: SRV name to resolve (default: web.service.consul)
//! - `STRATEGY`: `random` or `round-robin` (default: round-robin)
//! - `CACHE_TTL_SECS`: pool time-to-live in seconds (default: 0)
//! - `STALE_GRACE_SECS`: stale pool grace window in seconds (default: disabled)
//! - `REQUEST_COUNT`: number of picks to make (default: 10)

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use srv_clb::{Config, LoadBalancer, Strategy};
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let address = env::var("DISCOVERY_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("DISCOVERY_PORT").unwrap_or_else(|_| "8600".to_string());
    let service_name =
        env::var("SERVICE_NAME").unwrap_or_else(|_| "web.service.consul".to_string());
    let strategy: Strategy = env::var("STRATEGY")
        .unwrap_or_else(|_| "round-robin".to_string())
        .parse()?;
    let ttl_secs: u64 = env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let grace_secs: Option<u64> = env::var("STALE_GRACE_SECS")
        .ok()
        .and_then(|g| g.parse().ok());
    let request_count: u32 = env::var("REQUEST_COUNT")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(10);

    info!("Discovery endpoint: {address}:{port}");
    info!("Service: {service_name}");
    info!("Strategy: {strategy}");

    let mut config = Config::new(&address, &port)?.ttl(Duration::from_secs(ttl_secs));
    if let Some(grace) = grace_secs {
        config = config.stale_grace(Duration::from_secs(grace));
    }

    let lb = LoadBalancer::from_config(config, strategy);

    let mut counts: HashMap<String, u32> = HashMap::new();

    for i in 1..=request_count {
        match lb.get_address(&service_name).await {
            Ok(addr) => {
                info!("Pick {i}: {addr}");
                *counts.entry(addr.to_string()).or_insert(0) += 1;
            }

            Err(e) => {
                error!("Pick {i} failed: {e}");
            }
        }
    }

    info!("=== Selection Summary ===");
    for (addr, count) in &counts {
        info!("{addr}: {count} picks");
    }

    Ok(())
}
