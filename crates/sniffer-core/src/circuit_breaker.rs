//! Circuit breaker guarding a target that has started failing.
//!
//! # Circuit States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[timeout]--> HALF_OPEN (one trial at a time)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------[success_threshold successes]--------------+
//! ```
//!
//! Admission and outcome reporting go through [`CircuitBreaker::acquire`],
//! which hands out a [`CallPermit`]. A permit that is dropped without being
//! settled frees the half-open trial slot without counting an outcome, so no
//! code path can leave the breaker waiting for a report that never comes.
//!
//! Every state transition starts a new epoch. A permit settled after the
//! epoch it was granted in has ended cannot close the circuit or free a
//! trial slot it never held; a stale failure only counts while Closed.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::AppError;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally.
    Closed,
    /// Circuit is open - requests are rejected immediately.
    Open,
    /// Circuit is half-open - a single trial request at a time probes recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Number of successful trials in half-open state to close the circuit.
    pub success_threshold: u32,

    /// Time to wait before transitioning from Open to Half-Open.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_error_message: Option<String>,
    trial_in_flight: bool,
    /// Bumped on every state transition.
    epoch: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_error_message: None,
            trial_in_flight: false,
            epoch: 0,
        }
    }

    fn enter(&mut self, state: CircuitState) {
        self.state = state;
        self.epoch += 1;
    }
}

/// Statistics about circuit breaker state for monitoring.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_error: Option<String>,
    pub time_until_half_open: Option<Duration>,
}

/// Thread-safe circuit breaker, shared by every clone of one client.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(CircuitBreakerInner::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state, handling lazy Open → HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        let time_until_half_open = if inner.state == CircuitState::Open {
            Some(self.remaining_cooldown(&inner))
        } else {
            None
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_error: inner.last_error_message.clone(),
            time_until_half_open,
        }
    }

    /// Admission check.
    ///
    /// - Closed: always admits
    /// - Open: refuses until the recovery timeout has elapsed, then moves to
    ///   HalfOpen and admits the caller as the trial
    /// - HalfOpen: admits only when no other trial is in flight
    ///
    /// An admitted HalfOpen caller owns the trial slot until it calls
    /// [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or [`release`](Self::release).
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock_inner();
        self.admit(&mut inner)
    }

    /// Admission check that returns a permit to settle, or `CircuitOpen`.
    pub fn acquire(&self) -> Result<CallPermit, AppError> {
        let mut inner = self.lock_inner();
        if self.admit(&mut inner) {
            Ok(CallPermit {
                breaker: self.clone(),
                trial: inner.state == CircuitState::HalfOpen,
                epoch: inner.epoch,
                settled: false,
            })
        } else {
            let retry_after = if inner.state == CircuitState::Open {
                self.remaining_cooldown(&inner)
            } else {
                Duration::ZERO
            };
            Err(AppError::CircuitOpen {
                name: self.name.clone(),
                retry_after,
            })
        }
    }

    fn admit(&self, inner: &mut CircuitBreakerInner) -> bool {
        self.maybe_transition_to_half_open(inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        self.on_success(&mut inner);
    }

    pub fn record_failure(&self, error: &AppError) {
        let mut inner = self.lock_inner();
        self.on_failure(&mut inner, error);
    }

    fn settle_success(&self, epoch: u64) {
        let mut inner = self.lock_inner();
        if inner.epoch != epoch {
            tracing::debug!(
                circuit = %self.name,
                "Ignoring success from an earlier circuit state"
            );
            return;
        }
        self.on_success(&mut inner);
    }

    fn settle_failure(&self, epoch: u64, error: &AppError) {
        let mut inner = self.lock_inner();
        if inner.epoch != epoch && inner.state != CircuitState::Closed {
            tracing::debug!(
                circuit = %self.name,
                error = %error,
                "Ignoring failure from an earlier circuit state"
            );
            return;
        }
        self.on_failure(&mut inner, error);
    }

    fn release_trial(&self, epoch: u64) {
        let mut inner = self.lock_inner();
        if inner.epoch == epoch {
            inner.trial_in_flight = false;
        }
    }

    fn on_success(&self, inner: &mut CircuitBreakerInner) {
        inner.trial_in_flight = false;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(
                        circuit = %self.name,
                        "Circuit breaker closing after {} successful trials",
                        inner.success_count
                    );
                    inner.enter(CircuitState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.last_error_message = None;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut CircuitBreakerInner, error: &AppError) {
        inner.trial_in_flight = false;
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        inner.last_error_message = Some(error.to_string());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        error = %error,
                        "Circuit breaker opening after {} consecutive failures",
                        inner.failure_count
                    );
                    inner.enter(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    error = %error,
                    "Circuit breaker trial failed, returning to open state"
                );
                inner.enter(CircuitState::Open);
                inner.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Frees the half-open trial slot without counting an outcome.
    pub fn release(&self) {
        self.lock_inner().trial_in_flight = false;
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Circuit breaker manually reset");
        let epoch = inner.epoch + 1;
        *inner = CircuitBreakerInner::new();
        inner.epoch = epoch;
    }

    fn remaining_cooldown(&self, inner: &CircuitBreakerInner) -> Duration {
        inner
            .last_failure_time
            .map(|t| self.config.recovery_timeout.saturating_sub(t.elapsed()))
            .unwrap_or(self.config.recovery_timeout)
    }

    fn maybe_transition_to_half_open(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure_time
            && last_failure.elapsed() > self.config.recovery_timeout
        {
            tracing::info!(
                circuit = %self.name,
                "Circuit breaker transitioning to half-open state"
            );
            inner.enter(CircuitState::HalfOpen);
            inner.success_count = 0;
            inner.trial_in_flight = false;
        }
    }
}

/// Admission granted by [`CircuitBreaker::acquire`].
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// Dropping it unsettled releases the half-open trial slot if it holds it.
pub struct CallPermit {
    breaker: CircuitBreaker,
    /// Holds the half-open trial slot.
    trial: bool,
    /// Breaker epoch at admission.
    epoch: u64,
    settled: bool,
}

impl CallPermit {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle_success(self.epoch);
    }

    pub fn failure(mut self, error: &AppError) {
        self.settled = true;
        self.breaker.settle_failure(self.epoch, error);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.epoch);
        }
    }
}
