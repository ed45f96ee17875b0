//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::ClientConfig;
use crate::error::AppError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{Glitch, Product};
use crate::retry::RetryPolicy;
use crate::throttle::ThrottleConfig;
use crate::traits::{GlitchNotifier, ProductSink, TargetAdapter, Transport};

/// Client config with no pacing, no backoff and no warm-up.
pub fn quiet_config() -> ClientConfig {
    ClientConfig::new("test")
        .with_throttle(ThrottleConfig::disabled())
        .with_retry(RetryPolicy::default().with_backoff(Duration::ZERO, 2.0, Duration::ZERO))
        .with_warm_up(false)
        .with_warm_up_pause(Duration::ZERO, Duration::ZERO)
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock transport with queued responses, fixed routes and call recording.
///
/// Exact-URL routes win over the queue. With both empty, every request gets
/// `200 {}`.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, AppError>>>>,
    routes: Arc<Mutex<HashMap<String, (u16, String)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    /// `"start <url>"` / `"end <url>"` in the order sends begin and finish.
    events: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<HttpResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    pub fn with_route(self, url: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_response(&self, request: &HttpRequest) -> Result<HttpResponse, AppError> {
        if let Some((status, body)) = self.routes.lock().unwrap().get(&request.url) {
            return Ok(HttpResponse::new(*status, request.url.clone(), body.clone()));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, request.url.clone(), "{}")))
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.requests.lock().unwrap().push(request.clone());
        self.events.lock().unwrap().push(format!("start {}", request.url));
        let response = self.next_response(&request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.events.lock().unwrap().push(format!("end {}", request.url));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Raw item understood by [`MockAdapter`]: `(id, current_price, list_price)`.
/// A negative current price fails normalization.
pub type RawItem = (String, f64, f64);

/// Mock adapter serving fixed raw items per unit.
///
/// Units without an entry fail in `fetch_raw`.
#[derive(Clone, Default)]
pub struct MockAdapter {
    units: Arc<Mutex<HashMap<String, Vec<RawItem>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(self, unit: &str, items: Vec<RawItem>) -> Self {
        self.units.lock().unwrap().insert(unit.to_string(), items);
        self
    }

    pub fn fetched_units(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

pub fn raw(id: &str, current: f64, list: f64) -> RawItem {
    (id.to_string(), current, list)
}

impl TargetAdapter for MockAdapter {
    type Raw = RawItem;

    fn name(&self) -> &str {
        "mockshop"
    }

    async fn fetch_raw(
        &self,
        unit: &str,
        _options: &serde_json::Value,
    ) -> Result<Vec<RawItem>, AppError> {
        self.fetched.lock().unwrap().push(unit.to_string());
        self.units
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .ok_or_else(|| AppError::NetworkError(format!("unit '{unit}' unreachable")))
    }

    fn normalize(&self, raw: RawItem) -> Result<Product, AppError> {
        let (id, current, list) = raw;
        if current < 0.0 {
            return Err(AppError::NormalizationError(format!(
                "negative price for {id}"
            )));
        }
        Ok(Product::new(id.clone(), format!("Product {id}")).with_prices(current, list))
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock sink recording saved batches, with optional failure and price history.
#[derive(Clone, Default)]
pub struct MockSink {
    batches: Arc<Mutex<Vec<Vec<Arc<Product>>>>>,
    previous: Arc<Mutex<HashMap<String, f64>>>,
    fail: bool,
    fail_history: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_previous_price(self, id: &str, price: f64) -> Self {
        self.previous.lock().unwrap().insert(id.to_string(), price);
        self
    }

    /// Price history lookups fail; saves still work.
    pub fn with_failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn batches(&self) -> Vec<Vec<Arc<Product>>> {
        self.batches.lock().unwrap().clone()
    }
}

impl ProductSink for MockSink {
    async fn save(&self, products: &[Arc<Product>]) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::DatabaseError("disk full".into()));
        }
        self.batches.lock().unwrap().push(products.to_vec());
        Ok(())
    }

    async fn previous_price(&self, product: &Product) -> Result<Option<f64>, AppError> {
        if self.fail_history {
            return Err(AppError::DatabaseError("history unavailable".into()));
        }
        Ok(self.previous.lock().unwrap().get(&product.id).copied())
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Mock notifier collecting every glitch it is handed.
#[derive(Clone, Default)]
pub struct MockNotifier {
    glitches: Arc<Mutex<Vec<Glitch>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn glitches(&self) -> Vec<Glitch> {
        self.glitches.lock().unwrap().clone()
    }
}

impl GlitchNotifier for MockNotifier {
    fn notify(&self, glitch: &Glitch) {
        self.glitches.lock().unwrap().push(glitch.clone());
    }
}
