use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::detector::GlitchDetector;
use crate::error::AppError;
use crate::models::{CycleSummary, ScrapeResult};
use crate::traits::{GlitchNotifier, ProductSink, TargetAdapter, TracingNotifier};

/// Runs the scrape pipeline for one target: fetch → normalize → detect → persist.
///
/// Failures stay where they happen. A bad item is recorded and skipped, a
/// failed unit is recorded in its own result, and every unit of a cycle
/// always gets a result.
pub struct ScrapeOrchestrator<A, S, N = TracingNotifier> {
    adapter: A,
    sink: S,
    notifier: N,
    detector: GlitchDetector,
    fetch_options: serde_json::Value,
}

impl<A, S> ScrapeOrchestrator<A, S, TracingNotifier>
where
    A: TargetAdapter,
    S: ProductSink,
{
    /// Create an orchestrator that logs glitches through `tracing`.
    pub fn new(adapter: A, sink: S) -> Self {
        Self {
            adapter,
            sink,
            notifier: TracingNotifier,
            detector: GlitchDetector::default(),
            fetch_options: serde_json::Value::Null,
        }
    }
}

impl<A, S, N> ScrapeOrchestrator<A, S, N>
where
    A: TargetAdapter,
    S: ProductSink,
    N: GlitchNotifier,
{
    pub fn with_notifier<M: GlitchNotifier>(self, notifier: M) -> ScrapeOrchestrator<A, S, M> {
        ScrapeOrchestrator {
            adapter: self.adapter,
            sink: self.sink,
            notifier,
            detector: self.detector,
            fetch_options: self.fetch_options,
        }
    }

    pub fn with_detector(mut self, detector: GlitchDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Opaque options handed to every `fetch_raw` call (page limits, filters...).
    pub fn with_fetch_options(mut self, options: serde_json::Value) -> Self {
        self.fetch_options = options;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run every unit once, in order. Always returns one result per unit.
    pub async fn run_cycle(&self, units: &[String]) -> Vec<ScrapeResult> {
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            results.push(self.run_unit(unit).await);
        }
        results
    }

    /// Run the pipeline for a single unit.
    pub async fn run_unit(&self, unit: &str) -> ScrapeResult {
        let target = self.adapter.name().to_string();
        let started = Instant::now();
        let mut result = ScrapeResult::new(target.as_str(), unit);

        tracing::info!(adapter = %target, unit, "Scraping unit");

        // 1. Fetch
        let raw_items = match self.adapter.fetch_raw(unit, &self.fetch_options).await {
            Ok(items) => items,
            Err(e) => {
                let err = AppError::UnitError {
                    unit: unit.to_string(),
                    message: e.to_string(),
                };
                tracing::error!(adapter = %target, unit, error = %e, "Unit fetch failed");
                result.errors.push(err.to_string());
                result.duration = started.elapsed();
                return result;
            }
        };
        tracing::debug!(adapter = %target, unit, count = raw_items.len(), "Fetched raw items");

        // 2. Normalize, in fetch order
        for raw in raw_items {
            match self.adapter.normalize(raw) {
                Ok(mut product) => {
                    product.source.clone_from(&target);
                    product.category = unit.to_string();
                    result.products.push(Arc::new(product));
                }
                Err(e) => {
                    tracing::warn!(adapter = %target, unit, error = %e, "Skipping item");
                    result.errors.push(e.to_string());
                }
            }
        }

        // 3. Detect
        for product in &result.products {
            let previous_price = match self.sink.previous_price(product).await {
                Ok(price) => price.unwrap_or(0.0),
                Err(e) => {
                    tracing::warn!(
                        adapter = %target,
                        product_id = %product.id,
                        error = %e,
                        "Previous price lookup failed, skipping drop check"
                    );
                    0.0
                }
            };
            if let Some(glitch) = self
                .adapter
                .detect_glitch(product, previous_price, &self.detector)
            {
                self.notifier.notify(&glitch);
                result.glitches.push(glitch);
            }
        }

        result.products_found = result.products.len();
        result.glitches_found = result.glitches.len();

        // 4. Persist
        if !result.products.is_empty() {
            match self.sink.save(&result.products).await {
                Ok(()) => result.persisted = true,
                Err(e) => {
                    tracing::error!(adapter = %target, unit, error = %e, "Failed to persist products");
                }
            }
        }

        result.duration = started.elapsed();
        tracing::info!(
            adapter = %target,
            unit,
            products = result.products_found,
            glitches = result.glitches_found,
            errors = result.errors.len(),
            elapsed_ms = %result.duration.as_millis(),
            "Unit complete"
        );
        result
    }

    /// Cycle, log the summary, sleep, repeat. Never returns.
    pub async fn run_forever(&self, units: &[String], interval: Duration) {
        let mut cycle = 0u64;
        loop {
            cycle += 1;
            self.run_logged_cycle(cycle, units).await;
            tokio::time::sleep(interval).await;
        }
    }

    /// Like [`run_forever`](Self::run_forever) but stops when `cancel_token`
    /// fires, either between cycles or during the sleep. A cycle in progress
    /// runs to completion. Returns the number of completed cycles.
    pub async fn run_until_cancelled(
        &self,
        units: &[String],
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> u64 {
        let mut cycle = 0u64;
        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            cycle += 1;
            self.run_logged_cycle(cycle, units).await;

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel_token.cancelled() => break,
            }
        }

        tracing::info!(adapter = %self.adapter.name(), cycles = cycle, "Scheduler stopped");
        cycle
    }

    async fn run_logged_cycle(&self, cycle: u64, units: &[String]) -> CycleSummary {
        let results = self.run_cycle(units).await;
        let summary = CycleSummary::from_results(cycle, &results);
        tracing::info!(
            adapter = %self.adapter.name(),
            cycle = summary.cycle,
            units = summary.units,
            failed_units = summary.failed_units,
            products = summary.products,
            glitches = summary.glitches,
            errors = summary.errors,
            elapsed_ms = %summary.elapsed.as_millis(),
            "Cycle complete"
        );
        summary
    }
}
