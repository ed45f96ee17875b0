use std::collections::HashMap;

use reqwest::Client;
use tokio::sync::Mutex;
use url::Url;

use sniffer_core::config::TransportConfig;
use sniffer_core::error::AppError;
use sniffer_core::http::{HttpRequest, HttpResponse, Method};
use sniffer_core::traits::Transport;
use sniffer_core::util::parse_http_url;

use crate::profiles::{BrowserProfile, header_pair};

struct Session {
    client: Option<Client>,
    profile: &'static BrowserProfile,
    generation: u64,
}

/// [`Transport`] over reqwest with a cookie-persistent session.
///
/// The session (connection pool plus cookie jar) is built on first use with
/// the current browser profile. [`reset`](Transport::reset) drops it; with
/// `rotate_profiles` the next session also presents a different browser.
pub struct ReqwestTransport {
    config: TransportConfig,
    session: Mutex<Session>,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, AppError> {
        let profile = BrowserProfile::by_name(&config.profile).ok_or_else(|| {
            AppError::ConfigError(format!("Unknown browser profile '{}'", config.profile))
        })?;

        if let Some(proxy) = &config.proxy {
            reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy '{proxy}': {e}")))?;
        }
        profile.headers(&config.extra_headers)?;

        Ok(Self {
            config,
            session: Mutex::new(Session {
                client: None,
                profile,
                generation: 0,
            }),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Name of the profile the current (or next) session presents.
    pub async fn profile_name(&self) -> &'static str {
        self.session.lock().await.profile.name
    }

    /// Number of sessions built so far.
    pub async fn generation(&self) -> u64 {
        self.session.lock().await.generation
    }

    /// Returns the live client, building a session if there is none.
    async fn client(&self) -> Result<Client, AppError> {
        let mut session = self.session.lock().await;
        if let Some(client) = &session.client {
            return Ok(client.clone());
        }

        let client = self.build_client(session.profile)?;
        session.generation += 1;
        tracing::debug!(
            profile = session.profile.name,
            generation = session.generation,
            "New HTTP session"
        );
        session.client = Some(client.clone());
        Ok(client)
    }

    fn build_client(&self, profile: &BrowserProfile) -> Result<Client, AppError> {
        let mut builder = Client::builder()
            .user_agent(profile.user_agent)
            .default_headers(profile.headers(&self.config.extra_headers)?)
            .cookie_store(true)
            .gzip(true)
            .timeout(self.config.timeout);

        if let Some(proxy) = &self.config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| AppError::NetworkError(format!("Failed to build HTTP client: {e}")))
    }

    fn timeout_secs(&self, request: &HttpRequest) -> u64 {
        request.timeout.unwrap_or(self.config.timeout).as_secs()
    }
}

/// Appends the request's query pairs to its URL.
fn request_url(request: &HttpRequest) -> Result<Url, AppError> {
    let mut url = parse_http_url(&request.url)?;
    if !request.query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let client = self.client().await?;
        let url = request_url(&request)?;

        let mut builder = match request.method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        for (name, value) in &request.headers {
            let (name, value) = header_pair(name, value)?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs(&request))
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs(&request))
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })?;

        Ok(HttpResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }

    async fn reset(&self) {
        let mut session = self.session.lock().await;
        session.client = None;
        if self.config.rotate_profiles {
            session.profile = session.profile.rotate();
        }
        tracing::info!(profile = session.profile.name, "HTTP session reset");
    }

    async fn close(&self) {
        self.session.lock().await.client = None;
    }
}
