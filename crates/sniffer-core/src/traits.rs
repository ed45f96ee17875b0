use std::future::Future;
use std::sync::Arc;

use crate::detector::GlitchDetector;
use crate::error::AppError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{Glitch, Product};

/// Sends raw HTTP requests. Owns the session (cookies, connections, identity).
///
/// Implementations report transport failures as `NetworkError`/`Timeout` and
/// return every HTTP status as a response; classification happens above.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest)
    -> impl Future<Output = Result<HttpResponse, AppError>> + Send;

    /// Drops the current session so the next request starts a fresh one.
    fn reset(&self) -> impl Future<Output = ()> + Send;

    /// Releases the session for good.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Per-target behavior plugged into the orchestrator.
///
/// An adapter owns whatever client it needs to reach its target.
pub trait TargetAdapter: Send + Sync {
    /// Raw item as returned by the target, before normalization.
    type Raw: Send;

    /// Target name, stamped on every product as `source`.
    fn name(&self) -> &str;

    /// Fetches all raw items of one work unit (e.g. a category).
    fn fetch_raw(
        &self,
        unit: &str,
        options: &serde_json::Value,
    ) -> impl Future<Output = Result<Vec<Self::Raw>, AppError>> + Send;

    /// Converts one raw item into a product.
    fn normalize(&self, raw: Self::Raw) -> Result<Product, AppError>;

    /// Checks one product for a glitch. Override for target-specific rules.
    fn detect_glitch(
        &self,
        product: &Arc<Product>,
        previous_price: f64,
        detector: &GlitchDetector,
    ) -> Option<Glitch> {
        detector.evaluate(product, previous_price)
    }
}

/// Persists products. Failures are reported, never retried by the caller.
pub trait ProductSink: Send + Sync {
    fn save(&self, products: &[Arc<Product>])
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Last known price of this product, if the sink keeps history.
    fn previous_price(
        &self,
        _product: &Product,
    ) -> impl Future<Output = Result<Option<f64>, AppError>> + Send {
        async { Ok(None) }
    }
}

/// Receives glitches as they are found. Must not block.
pub trait GlitchNotifier: Send + Sync {
    fn notify(&self, glitch: &Glitch);
}

/// A no-op ProductSink for use when persistence is not needed.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

impl ProductSink for NullSink {
    async fn save(&self, _products: &[Arc<Product>]) -> Result<(), AppError> {
        Ok(())
    }
}

/// Logs every glitch as a warning.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl GlitchNotifier for TracingNotifier {
    fn notify(&self, glitch: &Glitch) {
        tracing::warn!(
            severity = %glitch.severity,
            source = %glitch.product.source,
            product_id = %glitch.product.id,
            current_price = glitch.product.current_price,
            list_price = glitch.product.list_price,
            url = %glitch.product.url,
            "Price glitch: {}",
            glitch.reason
        );
    }
}
