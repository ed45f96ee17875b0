pub mod circuit_breaker;
pub mod client;
pub mod concurrent;
pub mod config;
pub mod detector;
pub mod error;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod throttle;
pub mod traits;
pub mod util;

#[cfg(test)]
mod testutil;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{ClientConfig, FetchClient};
pub use concurrent::ConcurrentFetchClient;
pub use config::{SnifferConfig, TransportConfig};
pub use detector::{GlitchDetector, GlitchThresholds};
pub use error::AppError;
pub use http::{HttpRequest, HttpResponse, Method, RequestOptions};
pub use models::{CycleSummary, Glitch, Product, ScrapeResult, Severity};
pub use orchestrator::ScrapeOrchestrator;
pub use retry::RetryPolicy;
pub use throttle::{DomainThrottle, ThrottleConfig};
pub use traits::{GlitchNotifier, NullSink, ProductSink, TargetAdapter, TracingNotifier, Transport};
