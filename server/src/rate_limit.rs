//! Per-IP rate limiting
//!
//! Sliding window over client addresses: at most `max_requests` requests in
//! any rolling `window` (defaults: 100 per 60 s). The check runs before the
//! handler, so a limited request has no side effects.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Configuration for the per-IP limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests per window from a single address.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Whether limiting is enforced at all.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// Time until the oldest request falls out of the window.
        retry_after: Duration,
    },
}

/// Timestamps of one address's requests inside the current window.
#[derive(Debug)]
struct SlidingWindow {
    requests: Vec<Instant>,
}

impl SlidingWindow {
    fn check_and_record(&mut self, config: &RateLimitConfig, now: Instant) -> RateLimitResult {
        let cutoff = now.checked_sub(config.window).unwrap_or(now);
        self.requests.retain(|&t| t > cutoff);

        if self.requests.len() >= config.max_requests as usize {
            let retry_after = self
                .requests
                .first()
                .map(|&oldest| config.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(config.window);
            return RateLimitResult::Limited { retry_after };
        }

        self.requests.push(now);
        RateLimitResult::Allowed
    }
}

/// Per-IP sliding window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: HashMap<IpAddr, SlidingWindow>,
    check_counter: u64,
}

impl RateLimiter {
    /// Run opportunistic cleanup after this many checks.
    const AUTO_CLEANUP_CHECK_INTERVAL: u64 = 64;

    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            check_counter: 0,
        }
    }

    /// Check whether a request from `ip` is allowed, recording it if so.
    pub fn check(&mut self, ip: IpAddr, now: Instant) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed;
        }

        let window = self
            .windows
            .entry(ip)
            .or_insert_with(|| SlidingWindow { requests: Vec::new() });
        let result = window.check_and_record(&self.config, now);

        self.check_counter = self.check_counter.wrapping_add(1);
        if self.check_counter % Self::AUTO_CLEANUP_CHECK_INTERVAL == 0 {
            self.cleanup(now);
        }
        result
    }

    /// Drop addresses with no activity in the last two windows.
    pub fn cleanup(&mut self, now: Instant) {
        let stale_after = self.config.window.saturating_mul(2);
        self.windows.retain(|_, w| {
            w.requests
                .iter()
                .any(|&t| now.saturating_duration_since(t) < stale_after)
        });
    }

    /// Number of addresses currently tracked.
    pub fn tracked_addresses(&self) -> usize {
        self.windows.len()
    }
}
