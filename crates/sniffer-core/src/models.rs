use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product normalized to the same shape regardless of the target it came from.
///
/// Prices are in the target's currency; `0.0` means unknown. Adapters build
/// these in `normalize`, after which the orchestrator stamps `source` and
/// `category` and shares the record read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Target-scoped identifier (not globally unique).
    pub id: String,
    pub name: String,
    pub brand: String,
    /// Price the shopper pays right now (offer price if any).
    pub current_price: f64,
    /// Reference price without the offer.
    pub list_price: f64,
    /// Discount as reported by the target.
    pub discount_pct: f64,
    pub url: String,
    pub image_url: String,
    pub category: String,
    /// Target name (e.g. "fravega").
    pub source: String,
    pub in_stock: bool,
    pub scraped_at: DateTime<Utc>,
    /// Adapter-specific fields kept verbatim (SKU codes, seller ids, ...).
    pub raw_data: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            brand: String::new(),
            current_price: 0.0,
            list_price: 0.0,
            discount_pct: 0.0,
            url: String::new(),
            image_url: String::new(),
            category: String::new(),
            source: String::new(),
            in_stock: true,
            scraped_at: Utc::now(),
            raw_data: serde_json::Map::new(),
        }
    }

    pub fn with_prices(mut self, current_price: f64, list_price: f64) -> Self {
        self.current_price = current_price;
        self.list_price = list_price;
        self
    }

    pub fn with_discount_pct(mut self, discount_pct: f64) -> Self {
        self.discount_pct = discount_pct;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn has_discount(&self) -> bool {
        self.discount_pct > 0.0 || (self.list_price > 0.0 && self.current_price < self.list_price)
    }

    /// Discount derived from the two prices, rounded to one decimal.
    ///
    /// Falls back to the reported `discount_pct` when either price is unknown.
    pub fn calculated_discount(&self) -> f64 {
        if self.list_price > 0.0 && self.current_price > 0.0 {
            round1((1.0 - self.current_price / self.list_price) * 100.0)
        } else {
            self.discount_pct
        }
    }

    /// Money left on the table if the list price is the market price.
    pub fn margin_potential(&self) -> f64 {
        (self.list_price - self.current_price).max(0.0)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// How alarming a glitch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}

/// A price flagged as likely erroneous or exceptionally favorable.
#[derive(Debug, Clone, Serialize)]
pub struct Glitch {
    pub product: Arc<Product>,
    pub reason: String,
    pub severity: Severity,
    /// Previously observed price, `0.0` if unknown.
    pub previous_price: f64,
    pub drop_pct: f64,
    pub detected_at: DateTime<Utc>,
}

impl Glitch {
    pub fn new(product: Arc<Product>, reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            product,
            reason: reason.into(),
            severity,
            previous_price: 0.0,
            drop_pct: 0.0,
            detected_at: Utc::now(),
        }
    }

    pub fn with_drop(mut self, previous_price: f64, drop_pct: f64) -> Self {
        self.previous_price = previous_price;
        self.drop_pct = drop_pct;
        self
    }
}

/// Outcome of one work unit within one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub target: String,
    pub unit: String,
    pub products_found: usize,
    pub glitches_found: usize,
    pub errors: Vec<String>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub products: Vec<Arc<Product>>,
    pub glitches: Vec<Glitch>,
    /// Whether the sink accepted this unit's batch.
    pub persisted: bool,
}

impl ScrapeResult {
    pub fn new(target: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            unit: unit.into(),
            products_found: 0,
            glitches_found: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
            started_at: Utc::now(),
            products: Vec::new(),
            glitches: Vec::new(),
            persisted: false,
        }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty() && self.products_found > 0
    }
}

/// Aggregate over every unit of one cycle, logged by the scheduling loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub units: usize,
    pub failed_units: usize,
    pub products: usize,
    pub glitches: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

impl CycleSummary {
    pub fn from_results(cycle: u64, results: &[ScrapeResult]) -> Self {
        Self {
            cycle,
            units: results.len(),
            failed_units: results.iter().filter(|r| !r.success()).count(),
            products: results.iter().map(|r| r.products_found).sum(),
            glitches: results.iter().map(|r| r.glitches_found).sum(),
            errors: results.iter().map(|r| r.errors.len()).sum(),
            elapsed: results.iter().map(|r| r.duration).sum(),
        }
    }
}
