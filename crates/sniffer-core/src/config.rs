use std::str::FromStr;
use std::time::Duration;

use crate::client::ClientConfig;
use crate::detector::GlitchThresholds;
use crate::error::AppError;

/// Settings for the concrete HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout unless a request overrides it.
    pub timeout: Duration,
    /// Browser profile presented by new sessions (e.g. "chrome", "safari").
    pub profile: String,
    /// Pick a different profile each time the session is rotated.
    pub rotate_profiles: bool,
    /// Proxy URL (`http://`, `https://` or `socks5://`).
    pub proxy: Option<String>,
    /// Headers added to every request, after the profile's own.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            profile: "chrome".to_string(),
            rotate_profiles: false,
            proxy: None,
            extra_headers: Vec::new(),
        }
    }
}

/// Everything a sniffer process needs, loadable from `SNIFFER_*` variables.
#[derive(Debug, Clone)]
pub struct SnifferConfig {
    pub client: ClientConfig,
    pub transport: TransportConfig,
    pub thresholds: GlitchThresholds,
    /// Permits of the concurrent client.
    pub max_concurrent: usize,
    /// Sleep between scrape cycles.
    pub interval: Duration,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("sniffer"),
            transport: TransportConfig::default(),
            thresholds: GlitchThresholds::default(),
            max_concurrent: 3,
            interval: Duration::from_secs(60),
        }
    }
}

impl SnifferConfig {
    /// Load from the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let vars = Vars(&lookup);

        // Transport
        if let Some(secs) = vars.positive::<u64>("SNIFFER_TIMEOUT_SECS")? {
            config.transport.timeout = Duration::from_secs(secs);
        }
        if let Some(profile) = vars.string("SNIFFER_BROWSER") {
            config.transport.profile = profile;
        }
        if let Some(rotate) = vars.flag("SNIFFER_ROTATE_PROFILES")? {
            config.transport.rotate_profiles = rotate;
        }
        config.transport.proxy = vars.string("SNIFFER_PROXY");

        // Stealth gate
        let throttle = &mut config.client.throttle;
        if let Some(enabled) = vars.flag("SNIFFER_STEALTH")? {
            throttle.enabled = enabled;
        }
        if let Some(ms) = vars.parse::<u64>("SNIFFER_MIN_DELAY_MS")? {
            throttle.min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = vars.parse::<u64>("SNIFFER_MAX_DELAY_MS")? {
            throttle.max_delay = Duration::from_millis(ms);
        }
        if throttle.min_delay > throttle.max_delay {
            return Err(AppError::ConfigError(format!(
                "SNIFFER_MIN_DELAY_MS ({}) exceeds SNIFFER_MAX_DELAY_MS ({})",
                throttle.min_delay.as_millis(),
                throttle.max_delay.as_millis()
            )));
        }
        if let Some(max) = vars.positive::<usize>("SNIFFER_MAX_REQUESTS_PER_HOUR")? {
            throttle.max_requests_per_hour = max;
        }

        // Retries and breaker
        if let Some(attempts) = vars.positive::<u32>("SNIFFER_MAX_ATTEMPTS")? {
            config.client.retry.max_attempts = attempts;
        }
        if let Some(threshold) = vars.positive::<u32>("SNIFFER_FAILURE_THRESHOLD")? {
            config.client.breaker.failure_threshold = threshold;
        }
        if let Some(secs) = vars.parse::<u64>("SNIFFER_RECOVERY_TIMEOUT_SECS")? {
            config.client.breaker.recovery_timeout = Duration::from_secs(secs);
        }
        if let Some(warm_up) = vars.flag("SNIFFER_WARM_UP")? {
            config.client.warm_up = warm_up;
        }

        // Scheduling
        if let Some(max) = vars.positive::<usize>("SNIFFER_MAX_CONCURRENT")? {
            config.max_concurrent = max;
        }
        if let Some(secs) = vars.parse::<u64>("SNIFFER_INTERVAL_SECS")? {
            config.interval = Duration::from_secs(secs);
        }

        // Detection
        let thresholds = &mut config.thresholds;
        if let Some(pct) = vars.parse::<f64>("SNIFFER_HIGH_DISCOUNT_PCT")? {
            thresholds.high_discount_pct = pct;
        }
        if let Some(pct) = vars.parse::<f64>("SNIFFER_SEVERE_DISCOUNT_PCT")? {
            thresholds.severe_discount_pct = pct;
        }
        if let Some(price) = vars.parse::<f64>("SNIFFER_MIN_SANE_PRICE")? {
            thresholds.min_sane_price = price;
        }
        if let Some(pct) = vars.parse::<f64>("SNIFFER_STEEP_DROP_PCT")? {
            thresholds.steep_drop_pct = pct;
        }
        if thresholds.high_discount_pct > thresholds.severe_discount_pct {
            return Err(AppError::ConfigError(
                "SNIFFER_HIGH_DISCOUNT_PCT must not exceed SNIFFER_SEVERE_DISCOUNT_PCT".into(),
            ));
        }

        Ok(config)
    }

    /// Client config for one target, named after it.
    pub fn client_for(&self, name: impl Into<String>) -> ClientConfig {
        ClientConfig {
            name: name.into(),
            ..self.client.clone()
        }
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}': not a valid number"))
            }),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.parse::<T>(key)? {
            Some(value) if value <= T::default() => Err(AppError::ConfigError(format!(
                "{key} must be at least 1"
            ))),
            other => Ok(other),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, AppError> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(AppError::ConfigError(format!(
                    "Invalid {key} '{raw}': expected true or false"
                ))),
            },
        }
    }
}
