//! Session configuration

use std::fmt;
use std::time::Duration;

use crate::security::DEFAULT_PBKDF2_ITERATIONS;

/// Configuration for one room session.
///
/// Every session carries its own configuration and its own rendezvous
/// client; there are no process-wide singletons, so multiple rooms run
/// fully independent sessions.
#[derive(Clone)]
pub struct SessionConfig {
    /// Base URL of the rendezvous server, e.g. `http://relay.example:8787`.
    pub rendezvous_base_url: String,

    /// PBKDF2 iteration count for key derivation.
    /// Default: 100000. All peers of a room must agree on this.
    pub pbkdf2_iterations: u32,

    /// Presence announce interval (seconds).
    /// Default: 60
    pub announce_interval_secs: u64,

    /// Presence poll interval (seconds). Belt-and-braces discovery next
    /// to the relay's push events.
    /// Default: 30
    pub poll_interval_secs: u64,

    /// Deadline for each rendezvous HTTP request (milliseconds).
    /// Default: 10000
    pub request_deadline_ms: u64,

    /// Total budget from first offer to authenticated (milliseconds).
    /// Default: 30000
    pub negotiation_budget_ms: u64,

    /// Deadline for the response to our auth challenge (milliseconds).
    /// Default: 5000
    pub auth_response_budget_ms: u64,

    /// Minimum relay reconnect backoff (seconds).
    /// Default: 5
    pub reconnect_min_backoff_secs: u64,

    /// Cap on the relay reconnect backoff (seconds).
    /// Default: 60
    pub reconnect_max_backoff_secs: u64,

    /// Consecutive rate-limited announces before announcements pause.
    /// Default: 3
    pub rate_limit_pause_after: u32,

    /// Batch interval for broadcasting local document changes (milliseconds).
    /// Default: 1000
    pub batch_interval_ms: u64,

    /// STUN/TURN-style hints for connectors that need them. The built-in
    /// connector does its own hole punching and ignores these.
    pub ice_servers: Vec<String>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("rendezvous_base_url", &self.rendezvous_base_url)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .field("announce_interval_secs", &self.announce_interval_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_deadline_ms", &self.request_deadline_ms)
            .field("negotiation_budget_ms", &self.negotiation_budget_ms)
            .field("auth_response_budget_ms", &self.auth_response_budget_ms)
            .field("reconnect_min_backoff_secs", &self.reconnect_min_backoff_secs)
            .field("reconnect_max_backoff_secs", &self.reconnect_max_backoff_secs)
            .field("rate_limit_pause_after", &self.rate_limit_pause_after)
            .field("batch_interval_ms", &self.batch_interval_ms)
            .field("ice_servers", &self.ice_servers)
            .finish()
    }
}

impl SessionConfig {
    /// Create a config pointing at a rendezvous server, everything else
    /// at defaults.
    pub fn new(rendezvous_base_url: impl Into<String>) -> Self {
        Self {
            rendezvous_base_url: rendezvous_base_url.into(),
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            announce_interval_secs: 60,
            poll_interval_secs: 30,
            request_deadline_ms: 10_000,
            negotiation_budget_ms: 30_000,
            auth_response_budget_ms: 5_000,
            reconnect_min_backoff_secs: 5,
            reconnect_max_backoff_secs: 60,
            rate_limit_pause_after: 3,
            batch_interval_ms: 1_000,
            ice_servers: Vec::new(),
        }
    }

    /// Set the PBKDF2 iteration count.
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    /// Set the announce interval.
    pub fn with_announce_interval(mut self, secs: u64) -> Self {
        self.announce_interval_secs = secs;
        self
    }

    /// Set the presence poll interval.
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the per-request HTTP deadline.
    pub fn with_request_deadline(mut self, ms: u64) -> Self {
        self.request_deadline_ms = ms;
        self
    }

    /// Set the negotiation budget.
    pub fn with_negotiation_budget(mut self, ms: u64) -> Self {
        self.negotiation_budget_ms = ms;
        self
    }

    /// Set the ICE server hints.
    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Configuration for tests: cheap key derivation, fast timers, short
    /// deadlines.
    pub fn for_testing(rendezvous_base_url: impl Into<String>) -> Self {
        Self {
            rendezvous_base_url: rendezvous_base_url.into(),
            pbkdf2_iterations: 1_000,
            announce_interval_secs: 1,
            poll_interval_secs: 1,
            request_deadline_ms: 2_000,
            negotiation_budget_ms: 5_000,
            auth_response_budget_ms: 2_000,
            reconnect_min_backoff_secs: 1,
            reconnect_max_backoff_secs: 2,
            rate_limit_pause_after: 3,
            batch_interval_ms: 50,
            ice_servers: Vec::new(),
        }
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn negotiation_budget(&self) -> Duration {
        Duration::from_millis(self.negotiation_budget_ms)
    }

    pub fn auth_response_budget(&self) -> Duration {
        Duration::from_millis(self.auth_response_budget_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}
