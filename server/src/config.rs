//! Server configuration

use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Configuration for the rendezvous server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:8787`.
    pub bind_addr: String,

    /// Lifetime of an unredeemed share code (seconds).
    /// Default: 300 (5 minutes)
    pub share_code_ttl_secs: u64,

    /// Lifetime of a presence record past its last refresh (seconds).
    /// Default: 120
    pub peer_ttl_secs: u64,

    /// Per-IP request budget per rolling window.
    /// Default: 100
    pub max_requests_per_ip_per_minute: u32,

    /// Rate limit window (seconds).
    /// Default: 60
    pub rate_limit_window_secs: u64,

    /// Whether the rate limiter is enforced.
    pub rate_limit_enabled: bool,

    /// Simultaneous signaling connections allowed per IP.
    /// Default: 8
    pub max_relay_connections_per_ip: usize,

    /// Upper bound on one HTTP request (headers + body).
    /// Default: 64 KB
    pub max_request_bytes: usize,

    /// Deadline for reading one request off the socket (seconds).
    /// Default: 10
    pub request_read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            share_code_ttl_secs: 300,
            peer_ttl_secs: 120,
            max_requests_per_ip_per_minute: 100,
            rate_limit_window_secs: 60,
            rate_limit_enabled: true,
            max_relay_connections_per_ip: 8,
            max_request_bytes: 64 * 1024,
            request_read_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the share code TTL.
    pub fn with_share_code_ttl(mut self, secs: u64) -> Self {
        self.share_code_ttl_secs = secs;
        self
    }

    /// Set the presence TTL.
    pub fn with_peer_ttl(mut self, secs: u64) -> Self {
        self.peer_ttl_secs = secs;
        self
    }

    /// Set the per-IP request budget.
    pub fn with_request_budget(mut self, per_minute: u32) -> Self {
        self.max_requests_per_ip_per_minute = per_minute;
        self
    }

    /// Disable rate limiting (local development only).
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit_enabled = false;
        self
    }

    /// Configuration for tests: ephemeral port, short TTLs, a budget large
    /// enough that ordinary tests never trip it.
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            share_code_ttl_secs: 300,
            peer_ttl_secs: 120,
            max_requests_per_ip_per_minute: 10_000,
            rate_limit_window_secs: 60,
            rate_limit_enabled: true,
            max_relay_connections_per_ip: 64,
            max_request_bytes: 64 * 1024,
            request_read_timeout_secs: 10,
        }
    }

    pub fn share_code_ttl(&self) -> Duration {
        Duration::from_secs(self.share_code_ttl_secs)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests_per_ip_per_minute,
            window: Duration::from_secs(self.rate_limit_window_secs),
            enabled: self.rate_limit_enabled,
        }
    }
}
