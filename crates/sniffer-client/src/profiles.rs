//! Browser identities presented by transport sessions.
//!
//! A profile fixes the User-Agent and the client-hint headers a real browser
//! of that family sends. Regional headers (Argentine Spanish) are layered on
//! top for every profile.

use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue};

use sniffer_core::AppError;

/// Accept-Language sent by every session.
pub const ACCEPT_LANGUAGE_AR: &str = "es-AR,es;q=0.9,en;q=0.8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub user_agent: &'static str,
    /// `Sec-Ch-Ua`; Safari sends no client hints.
    pub sec_ch_ua: Option<&'static str>,
    pub sec_ch_ua_mobile: Option<&'static str>,
    pub sec_ch_ua_platform: Option<&'static str>,
}

const CHROME_124_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub static PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        name: "chrome",
        user_agent: CHROME_124_UA,
        sec_ch_ua: Some(r#""Chromium";v="124", "Google Chrome";v="124", "Not-A.Brand";v="99""#),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some(r#""Windows""#),
    },
    BrowserProfile {
        name: "chrome119",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        sec_ch_ua: Some(r#""Google Chrome";v="119", "Chromium";v="119", "Not?A_Brand";v="24""#),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some(r#""Windows""#),
    },
    BrowserProfile {
        name: "chrome120",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        sec_ch_ua: Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some(r#""Windows""#),
    },
    BrowserProfile {
        name: "chrome124",
        user_agent: CHROME_124_UA,
        sec_ch_ua: Some(r#""Chromium";v="124", "Google Chrome";v="124", "Not-A.Brand";v="99""#),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some(r#""Windows""#),
    },
    BrowserProfile {
        name: "safari",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
    },
    BrowserProfile {
        name: "safari_ios",
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
    },
];

/// Profiles eligible for rotation, one per distinct identity.
pub const ROTATION: &[&str] = &["chrome119", "chrome120", "chrome124"];

impl BrowserProfile {
    pub fn by_name(name: &str) -> Option<&'static BrowserProfile> {
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// A random profile from [`ROTATION`] whose User-Agent differs from this one.
    pub fn rotate(&self) -> &'static BrowserProfile {
        let candidates: Vec<&'static BrowserProfile> = ROTATION
            .iter()
            .filter_map(|name| Self::by_name(name))
            .filter(|p| p.user_agent != self.user_agent)
            .collect();
        candidates
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(&PROFILES[0])
    }

    /// Session-wide headers: client hints, regional language, then `extra`.
    pub fn headers(&self, extra: &[(String, String)]) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_AR));

        let hints = [
            ("sec-ch-ua", self.sec_ch_ua),
            ("sec-ch-ua-mobile", self.sec_ch_ua_mobile),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform),
        ];
        for (name, value) in hints {
            if let Some(value) = value {
                headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
            }
        }

        for (name, value) in extra {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Validates one header pair.
pub fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), AppError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AppError::ConfigError(format!("Invalid header name '{name}'")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| AppError::ConfigError(format!("Invalid value for header '{name}'")))?;
    Ok((header_name, header_value))
}
