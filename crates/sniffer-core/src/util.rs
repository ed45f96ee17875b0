use std::time::Duration;

use rand::Rng;
use url::Url;

use crate::error::AppError;

/// Uniformly random duration in `[low, high]`, millisecond resolution.
///
/// Bounds may be given in either order; equal bounds return that bound.
pub fn uniform_between(low: Duration, high: Duration) -> Duration {
    let (lo, hi) = if low <= high { (low, high) } else { (high, low) };
    let lo_ms = lo.as_millis() as u64;
    let hi_ms = hi.as_millis() as u64;
    if lo_ms == hi_ms {
        return lo;
    }
    Duration::from_millis(rand::rng().random_range(lo_ms..=hi_ms))
}

/// Parses an absolute `http`/`https` URL with a host.
pub fn parse_http_url(url_str: &str) -> Result<Url, AppError> {
    let invalid = |reason: String| AppError::InvalidUrl {
        url: url_str.to_string(),
        reason,
    };
    let url = Url::parse(url_str).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Host key used for per-host bookkeeping: `host` or `host:port` when the
/// port is explicit. Returns `None` for unparseable or host-less URLs.
pub fn host_key(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// `scheme://host[:port]/` for a URL, the page a browser would land on first.
pub fn base_url(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = url.host_str()?;
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    Some(format!("{}://{}{}/", url.scheme(), host, port))
}
