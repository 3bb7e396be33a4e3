//! Rendezvous server binary
//!
//! Configuration comes from the environment:
//!
//! - `COVE_BIND` - bind address (default `127.0.0.1:8787`)
//! - `COVE_MAX_REQUESTS_PER_MINUTE` - per-IP budget (default 100)
//! - `COVE_SHARE_CODE_TTL_SECS` - invite lifetime (default 300)
//! - `COVE_PEER_TTL_SECS` - presence lifetime (default 120)
//! - `RUST_LOG` - tracing filter (default `info`)

use tracing_subscriber::EnvFilter;

use cove_server::{Server, ServerConfig};

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let defaults = ServerConfig::default();
    let config = ServerConfig::new()
        .with_bind_addr(std::env::var("COVE_BIND").unwrap_or(defaults.bind_addr))
        .with_request_budget(env_parse(
            "COVE_MAX_REQUESTS_PER_MINUTE",
            defaults.max_requests_per_ip_per_minute,
        ))
        .with_share_code_ttl(env_parse(
            "COVE_SHARE_CODE_TTL_SECS",
            defaults.share_code_ttl_secs,
        ))
        .with_peer_ttl(env_parse("COVE_PEER_TTL_SECS", defaults.peer_ttl_secs));

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to bind rendezvous server: {}", e);
            std::process::exit(1);
        }
    };

    server.run().await;
}
