//! Resilient HTTP client: breaker admission, stealth gate, retries.
//!
//! A URL that is not absolute http(s) fails with `InvalidUrl` before any
//! attempt. Every other request goes through the same path, per attempt:
//!
//! ```text
//! breaker.acquire ──refused──> CircuitOpen
//!        │
//! throttle.wait (pacing + host quota)
//!        │
//! transport.send ──error──> retry (no breaker outcome)
//!        │
//! classify status:
//!   2xx/3xx  success, returned
//!   403      AccessDenied, breaker failure, never retried
//!   429      wait Retry-After (or fallback), retried, breaker untouched
//!   5xx      ServerError, breaker failure, retried
//!   other    HttpStatus, returned as is
//! ```
//!
//! When every attempt fails with a retryable error the breaker records one
//! more failure and the caller gets a `NetworkError` carrying the last cause.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::AppError;
use crate::http::{GraphqlPayload, HttpRequest, HttpResponse, RequestOptions};
use crate::retry::RetryPolicy;
use crate::throttle::{DomainThrottle, ThrottleConfig};
use crate::traits::Transport;
use crate::util::{base_url, host_key, parse_http_url, uniform_between};

/// Resilience settings for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Used to name the circuit breaker in logs and errors.
    pub name: String,
    pub breaker: CircuitBreakerConfig,
    pub throttle: ThrottleConfig,
    pub retry: RetryPolicy,
    /// GET the host's base URL before the first request to it.
    pub warm_up: bool,
    /// Pause after a successful warm-up, drawn uniformly from this range.
    pub warm_up_pause: (Duration, Duration),
}

impl ClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            breaker: CircuitBreakerConfig::default(),
            throttle: ThrottleConfig::default(),
            retry: RetryPolicy::default(),
            warm_up: true,
            warm_up_pause: (Duration::from_secs(1), Duration::from_secs(3)),
        }
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_warm_up(mut self, enabled: bool) -> Self {
        self.warm_up = enabled;
        self
    }

    pub fn with_warm_up_pause(mut self, min: Duration, max: Duration) -> Self {
        self.warm_up_pause = (min, max);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Sequential resilient client over a [`Transport`].
///
/// Clones share the transport session, breaker, throttle and warm-up state.
pub struct FetchClient<T> {
    config: ClientConfig,
    transport: Arc<T>,
    breaker: CircuitBreaker,
    throttle: DomainThrottle,
    /// One warm-up cell per host; every request to the host awaits it.
    warm_ups: Arc<Mutex<HashMap<String, Arc<OnceCell<()>>>>>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for FetchClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            breaker: self.breaker.clone(),
            throttle: self.throttle.clone(),
            warm_ups: Arc::clone(&self.warm_ups),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T: Transport> FetchClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let breaker = CircuitBreaker::new(config.name.clone(), config.breaker.clone());
        let throttle = DomainThrottle::new(config.throttle.clone());
        Self {
            config,
            transport: Arc::new(transport),
            breaker,
            throttle,
            warm_ups: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces this client's throttle with one shared with other clients.
    pub fn with_shared_throttle(mut self, throttle: DomainThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn throttle(&self) -> &DomainThrottle {
        &self.throttle
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse, AppError> {
        self.execute(HttpRequest::get(url).with_options(options))
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> Result<HttpResponse, AppError> {
        self.execute(HttpRequest::post_json(url, body.clone()).with_options(options))
            .await
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<R, AppError> {
        self.get(url, options).await?.json()
    }

    pub async fn post_json<R: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> Result<R, AppError> {
        self.post(url, body, options).await?.json()
    }

    /// POSTs `{query, variables}` and returns the decoded response body.
    pub async fn graphql(
        &self,
        url: &str,
        query: &str,
        variables: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, AppError> {
        let payload = GraphqlPayload::new(query, variables).to_value()?;
        self.post_json(url, &payload, &RequestOptions::default())
            .await
    }

    /// Visits `base_url` so the session picks up cookies like a browser would.
    ///
    /// Concurrent callers for the same host wait for one visit (and its
    /// pause) to finish. Returns `false` if the visit failed; failures are
    /// logged, never raised, and the next caller tries again.
    pub async fn warm_session(&self, base_url: &str) -> bool {
        let Some(host) = host_key(base_url) else {
            tracing::warn!(url = base_url, "Cannot warm session for URL without host");
            return false;
        };
        let cell = self.warm_up_cell(&host);
        match cell.get_or_try_init(|| self.visit(&host, base_url)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Session warm-up failed");
                false
            }
        }
    }

    async fn visit(&self, host: &str, base_url: &str) -> Result<(), AppError> {
        tracing::info!(host, "Warming session");
        self.send_with_retry(HttpRequest::get(base_url)).await?;

        let (min, max) = self.config.warm_up_pause;
        let pause = uniform_between(min, max);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    /// Starts a fresh transport session and forgets every warmed host.
    pub async fn rotate_session(&self) {
        self.transport.reset().await;
        self.lock_warm_ups().clear();
        tracing::info!(client = %self.config.name, "Session rotated");
    }

    /// Closes the transport. Later requests fail with `ClientClosed`.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.close().await;
            tracing::debug!(client = %self.config.name, "Client closed");
        }
    }

    /// Full request path: optional warm-up, then attempts under the retry policy.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        if self.config.warm_up {
            self.ensure_warm(&request.url).await;
        }
        self.send_with_retry(request).await
    }

    async fn ensure_warm(&self, url: &str) {
        let Some(host) = host_key(url) else {
            return;
        };
        if self.warm_up_cell(&host).initialized() {
            return;
        }
        if let Some(base) = base_url(url) {
            self.warm_session(&base).await;
        }
    }

    async fn send_with_retry(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        if self.is_closed() {
            return Err(AppError::ClientClosed);
        }
        parse_http_url(&request.url)?;

        let policy = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..policy.max_attempts {
            match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if policy.has_attempts_after(attempt) {
                        let delay = policy.delay_for_attempt(attempt);
                        tracing::warn!(
                            url = %request.url,
                            attempt = attempt + 1,
                            max_attempts = policy.max_attempts,
                            delay_ms = %delay.as_millis(),
                            error = %e,
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
        let err = AppError::NetworkError(format!(
            "{} {} failed after {} attempts: {cause}",
            request.method, request.url, policy.max_attempts
        ));
        tracing::error!(url = %request.url, error = %err, "Retries exhausted");
        self.breaker.record_failure(&err);
        Err(err)
    }

    /// One attempt. The permit is settled for outcomes the breaker counts and
    /// dropped (released) for everything else.
    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, AppError> {
        let permit = self.breaker.acquire()?;
        self.throttle.wait(&request.url).await;

        let response = self.transport.send(request.clone()).await?;
        let url = request.url.clone();

        match response.status {
            403 => {
                let err = AppError::AccessDenied { url, status: 403 };
                tracing::error!(error = %err, "Blocked by target");
                permit.failure(&err);
                Err(err)
            }
            429 => {
                drop(permit);
                let waited = self.config.retry.rate_limit_wait(response.retry_after());
                tracing::warn!(
                    url = %url,
                    wait_secs = waited.as_secs(),
                    "Rate limited (429), backing off"
                );
                tokio::time::sleep(waited).await;
                Err(AppError::RateLimited { url, waited })
            }
            status if status >= 500 => {
                let err = AppError::ServerError { url, status };
                permit.failure(&err);
                Err(err)
            }
            _ if response.is_success() => {
                permit.success();
                Ok(response)
            }
            status => Err(AppError::HttpStatus { url, status }),
        }
    }

    fn warm_up_cell(&self, host: &str) -> Arc<OnceCell<()>> {
        Arc::clone(self.lock_warm_ups().entry(host.to_string()).or_default())
    }

    fn lock_warm_ups(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<()>>>> {
        self.warm_ups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
