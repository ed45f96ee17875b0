//! Stealth gate: randomized pacing plus a per-host hourly quota.
//!
//! Two mechanisms run before every request:
//!
//! - **Pacing**: if the previous request left less than `min_delay` ago, the
//!   next one goes out `uniform(min_delay, max_delay)` after it. Fixed
//!   intervals are easy to fingerprint; random ones look like a person.
//! - **Quota**: a rolling window (1 hour by default) of request timestamps per
//!   host. When the window is full the caller waits for the oldest entry to
//!   age out, capped at `max_quota_wait`, then proceeds regardless.
//!
//! The throttle is `Clone` and lock-guarded. Hand the same instance to several
//! clients to make them share one budget (e.g. one egress IP).
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use sniffer_core::throttle::{DomainThrottle, ThrottleConfig};
//!
//! let config = ThrottleConfig::default()
//!     .with_delay_range(Duration::from_millis(800), Duration::from_millis(2500))
//!     .with_max_requests_per_hour(300);
//! let throttle = DomainThrottle::new(config);
//! # let _ = throttle;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::util::{host_key, uniform_between};

/// Configuration for the stealth gate.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Master switch; `false` disables both pacing and quota.
    pub enabled: bool,

    /// Lower bound of the randomized gap between consecutive requests.
    pub min_delay: Duration,

    /// Upper bound of the randomized gap between consecutive requests.
    pub max_delay: Duration,

    /// Requests allowed per host within `quota_window`.
    pub max_requests_per_hour: usize,

    /// Length of the rolling quota window.
    pub quota_window: Duration,

    /// Longest a single quota wait may block.
    pub max_quota_wait: Duration,
}

impl ThrottleConfig {
    /// Config with stealth turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_delay_range(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_requests_per_hour(mut self, max: usize) -> Self {
        self.max_requests_per_hour = max;
        self
    }

    pub fn with_quota_window(mut self, window: Duration, max_wait: Duration) -> Self {
        self.quota_window = window;
        self.max_quota_wait = max_wait;
        self
    }
}

impl Default for ThrottleConfig {
    /// 0.8–2.5 s between requests, 300 requests per host per hour, waits capped at 5 min.
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(2500),
            max_requests_per_hour: 300,
            quota_window: Duration::from_secs(3600),
            max_quota_wait: Duration::from_secs(300),
        }
    }
}

/// Bookkeeping behind the gate. Planning is pure over an `Instant` so the
/// quota arithmetic can be checked without sleeping.
#[derive(Debug, Default)]
struct ThrottleState {
    /// Send time of the most recent (or most recently reserved) request.
    last_request: Option<Instant>,
    /// Send times per host, oldest first.
    requests: HashMap<String, VecDeque<Instant>>,
}

impl ThrottleState {
    /// When the next request may go out, given pacing alone.
    fn pacing_slot(&self, now: Instant, config: &ThrottleConfig) -> Instant {
        match self.last_request {
            Some(last) if now < last + config.min_delay => {
                let gap = uniform_between(config.min_delay, config.max_delay);
                (last + gap).max(now)
            }
            _ => now,
        }
    }

    /// Extra wait imposed by the host quota for a request sent at `at`.
    fn quota_wait(&mut self, host: &str, at: Instant, config: &ThrottleConfig) -> Duration {
        let window = config.quota_window;
        let sent = self.requests.entry(host.to_string()).or_default();
        while sent
            .front()
            .is_some_and(|&t| at.saturating_duration_since(t) >= window)
        {
            sent.pop_front();
        }

        if sent.len() < config.max_requests_per_hour {
            return Duration::ZERO;
        }

        let oldest = sent.front().copied().unwrap_or(at);
        let until_expiry = window.saturating_sub(at.saturating_duration_since(oldest));
        until_expiry.min(config.max_quota_wait)
    }

    /// Reserves the next send slot for `host`.
    ///
    /// Returns the slot and the part of the delay owed to the quota.
    fn plan(
        &mut self,
        host: Option<&str>,
        now: Instant,
        config: &ThrottleConfig,
    ) -> (Instant, Duration) {
        let mut send_at = self.pacing_slot(now, config);
        let mut quota_wait = Duration::ZERO;
        if let Some(host) = host {
            quota_wait = self.quota_wait(host, send_at, config);
            send_at += quota_wait;
            self.requests
                .entry(host.to_string())
                .or_default()
                .push_back(send_at);
        }
        self.last_request = Some(send_at);
        (send_at, quota_wait)
    }

    fn reserve(&mut self, host: Option<&str>, now: Instant, config: &ThrottleConfig) -> Instant {
        self.plan(host, now, config).0
    }
}

/// Lock-guarded stealth gate shared by every clone.
#[derive(Clone)]
pub struct DomainThrottle {
    config: ThrottleConfig,
    state: Arc<Mutex<ThrottleState>>,
}

impl DomainThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Waits until a request to `url` may be sent and records it.
    ///
    /// Returns how long the caller was held back.
    pub async fn wait(&self, url: &str) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }

        let host = host_key(url);
        let now = Instant::now();
        let send_at = {
            let mut state = self.state.lock().await;
            let (send_at, quota_wait) = state.plan(host.as_deref(), now, &self.config);
            if !quota_wait.is_zero() {
                tracing::warn!(
                    host = host.as_deref().unwrap_or("-"),
                    limit = self.config.max_requests_per_hour,
                    wait_secs = quota_wait.as_secs(),
                    "Host quota reached, waiting"
                );
            }
            send_at
        };

        let delay = send_at.saturating_duration_since(now);
        if !delay.is_zero() {
            tracing::debug!(
                host = host.as_deref().unwrap_or("-"),
                sleep_ms = %delay.as_millis(),
                "Stealth delay"
            );
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Number of requests to `host` still inside the quota window.
    pub async fn requests_in_window(&self, host: &str) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state.requests.get(host).map_or(0, |sent| {
            sent.iter()
                .filter(|&&t| now.saturating_duration_since(t) < self.config.quota_window)
                .count()
        })
    }
}
