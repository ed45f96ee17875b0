use std::sync::Arc;

use crate::models::{Glitch, Product, Severity};

/// Thresholds for price anomaly detection. Percentages are 0–100.
#[derive(Debug, Clone)]
pub struct GlitchThresholds {
    /// Discount at which a product is flagged at all.
    pub high_discount_pct: f64,
    /// Discount at which the flag escalates to high severity.
    pub severe_discount_pct: f64,
    /// Prices below this, on an item listed at or above it, are not believable.
    pub min_sane_price: f64,
    /// Drop against the previous observation that counts as a glitch.
    pub steep_drop_pct: f64,
}

impl Default for GlitchThresholds {
    fn default() -> Self {
        Self {
            high_discount_pct: 40.0,
            severe_discount_pct: 60.0,
            min_sane_price: 1000.0,
            steep_drop_pct: 50.0,
        }
    }
}

/// Stateless price anomaly rules. The first matching rule wins:
///
/// 1. a price under `min_sane_price` on an item listed at or above it is critical
/// 2. a calculated discount of at least `high_discount_pct` is medium, high past
///    `severe_discount_pct`
/// 3. a drop of at least `steep_drop_pct` against the previous price is high
#[derive(Debug, Clone, Default)]
pub struct GlitchDetector {
    thresholds: GlitchThresholds,
}

impl GlitchDetector {
    pub fn new(thresholds: GlitchThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GlitchThresholds {
        &self.thresholds
    }

    /// Evaluates one product. `previous_price` is `0.0` when unknown.
    pub fn evaluate(&self, product: &Arc<Product>, previous_price: f64) -> Option<Glitch> {
        let t = &self.thresholds;
        let current = product.current_price;

        if current > 0.0 && current < t.min_sane_price && product.list_price >= t.min_sane_price {
            return Some(Glitch::new(
                Arc::clone(product),
                format!(
                    "Price {current:.2} below sane floor {:.2} (list {:.2})",
                    t.min_sane_price, product.list_price
                ),
                Severity::Critical,
            ));
        }

        let discount = product.calculated_discount();
        if discount >= t.high_discount_pct {
            let severity = if discount >= t.severe_discount_pct {
                Severity::High
            } else {
                Severity::Medium
            };
            return Some(Glitch::new(
                Arc::clone(product),
                format!("Discount of {discount:.1}%"),
                severity,
            ));
        }

        if previous_price > 0.0 && current > 0.0 {
            let raw_drop = (1.0 - current / previous_price) * 100.0;
            if raw_drop >= t.steep_drop_pct {
                let drop_pct = round1(raw_drop);
                return Some(
                    Glitch::new(
                        Arc::clone(product),
                        format!("Price dropped {drop_pct:.1}% from {previous_price:.2}"),
                        Severity::High,
                    )
                    .with_drop(previous_price, drop_pct),
                );
            }
        }

        None
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
