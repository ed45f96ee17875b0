use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use sniffer_core::{
    AppError, ClientConfig, FetchClient, HttpRequest, HttpResponse, Product, ProductSink,
    RequestOptions, RetryPolicy, TargetAdapter, ThrottleConfig, Transport,
};

pub const BASE: &str = "https://tienda.test";

/// Routes pipeline logs to the test harness; `RUST_LOG` narrows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sniffer_core=debug".into()),
        )
        .try_init();
}

/// In-memory storefront: category URL → (status, body).
#[derive(Clone, Default)]
pub struct FakeStore {
    pages: Arc<Mutex<HashMap<String, (u16, String)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(self, category: &str, items: Value) -> Self {
        self.with_page(category, 200, json!({ "items": items }).to_string())
    }

    pub fn with_page(self, category: &str, status: u16, body: String) -> Self {
        self.set_page(category, status, body);
        self
    }

    /// Replaces a category listing in place, e.g. between cycles.
    pub fn set_category(&self, category: &str, items: Value) {
        self.set_page(category, 200, json!({ "items": items }).to_string());
    }

    fn set_page(&self, category: &str, status: u16, body: String) {
        self.pages
            .lock()
            .unwrap()
            .insert(category_url(category), (status, body));
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

pub fn category_url(category: &str) -> String {
    format!("{BASE}/api/catalog/{category}")
}

impl Transport for FakeStore {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.hits.lock().unwrap().push(request.url.clone());
        let page = self.pages.lock().unwrap().get(&request.url).cloned();
        Ok(match page {
            Some((status, body)) => HttpResponse::new(status, request.url, body),
            None if request.url == format!("{BASE}/") => {
                HttpResponse::new(200, request.url, "<html>home</html>")
            }
            None => HttpResponse::new(404, request.url, "not found"),
        })
    }

    async fn reset(&self) {}

    async fn close(&self) {}
}

pub fn fast_config() -> ClientConfig {
    ClientConfig::new("tienda")
        .with_throttle(ThrottleConfig::disabled())
        .with_retry(RetryPolicy::default().with_backoff(Duration::ZERO, 2.0, Duration::ZERO))
        .with_warm_up_pause(Duration::ZERO, Duration::ZERO)
}

/// Adapter reading `{"items": [{"sku", "title", "price", "list_price"}]}`.
pub struct CatalogAdapter {
    client: FetchClient<FakeStore>,
}

impl CatalogAdapter {
    pub fn new(client: FetchClient<FakeStore>) -> Self {
        Self { client }
    }
}

impl TargetAdapter for CatalogAdapter {
    type Raw = Value;

    fn name(&self) -> &str {
        "tienda"
    }

    async fn fetch_raw(&self, unit: &str, options: &Value) -> Result<Vec<Value>, AppError> {
        let mut request_options = RequestOptions::new();
        if let Some(limit) = options.get("limit").and_then(Value::as_u64) {
            request_options = request_options.query("limit", limit.to_string());
        }
        let page: Value = self
            .client
            .get_json(&category_url(unit), &request_options)
            .await?;
        Ok(page["items"].as_array().cloned().unwrap_or_default())
    }

    fn normalize(&self, raw: Value) -> Result<Product, AppError> {
        let sku = raw["sku"]
            .as_str()
            .ok_or_else(|| AppError::NormalizationError("missing sku".into()))?;
        let price = raw["price"]
            .as_f64()
            .ok_or_else(|| AppError::NormalizationError(format!("missing price for {sku}")))?;
        let list_price = raw["list_price"].as_f64().unwrap_or(0.0);
        let title = raw["title"].as_str().unwrap_or_default();

        Ok(Product::new(sku, title)
            .with_prices(price, list_price)
            .with_url(format!("{BASE}/p/{sku}")))
    }
}

/// Sink keeping every saved product in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<Arc<Product>>>>,
    calls: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn saved(&self) -> Vec<Arc<Product>> {
        self.saved.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ProductSink for MemorySink {
    async fn save(&self, products: &[Arc<Product>]) -> Result<(), AppError> {
        *self.calls.lock().unwrap() += 1;
        self.saved.lock().unwrap().extend(products.iter().cloned());
        Ok(())
    }

    async fn previous_price(&self, product: &Product) -> Result<Option<f64>, AppError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.id == product.id && p.source == product.source)
            .map(|p| p.current_price))
    }
}
