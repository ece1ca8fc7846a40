//! Client configuration, built in code or parsed from environment variables.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_LOCALE: &str = "en_us";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Path of the device's overview websocket.
pub const OVERVIEW_PATH: &str = "/ws/home/overview";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_HTTP_TIMEOUT_SECS, connect_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS }
    }
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Device address as `host` or `host:port`.
    pub host: String,
    /// Locale sent as `lang` with every request.
    pub locale: String,
    pub http_timeouts: HttpTimeouts,
}

impl ClientConfig {
    /// Config for `host`, which may carry a scheme or trailing slash.
    #[must_use]
    pub fn new(host: impl AsRef<str>) -> Self {
        Self {
            host: normalize_host(host.as_ref()),
            locale: DEFAULT_LOCALE.to_owned(),
            http_timeouts: HttpTimeouts::default(),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    #[must_use]
    pub fn with_http_timeouts(mut self, http_timeouts: HttpTimeouts) -> Self {
        self.http_timeouts = http_timeouts;
        self
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `WINET_HOST`
    ///
    /// Optional:
    /// - `WINET_LOCALE`: default `en_us`
    /// - `WINET_HTTP_TIMEOUT_SECS`: default 10
    /// - `WINET_HTTP_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the host is missing or a timeout is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("WINET_HOST")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingVar("WINET_HOST"))?;
        let locale = std::env::var("WINET_LOCALE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_owned());
        let http_timeouts = HttpTimeouts {
            request_secs: env_parse_u64("WINET_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            connect_secs: env_parse_u64("WINET_HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { host: normalize_host(&host), locale, http_timeouts })
    }

    /// Websocket endpoint of the device.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{OVERVIEW_PATH}", self.host)
    }

    /// Base URL for the plain HTTP lookups.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        format!("http://{}", self.host)
    }
}

/// Strip a scheme and trailing slashes so `http://10.0.0.5/` becomes `10.0.0.5`.
#[must_use]
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim();
    let rest = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);
    rest.trim_end_matches('/').to_owned()
}

fn env_parse_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue { var: key, value: raw })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
