//! Plain HTTP lookups.
//!
//! These endpoints answer each GET directly with the same envelope the socket
//! uses, so they bypass the pending call registry entirely. Two of them need
//! the session token from the socket handshake.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::envelope;
use crate::error::ClientError;

pub const ABOUT_PATH: &str = "/about/list";
pub const PRODUCTS_PATH: &str = "/product/list";
pub const DEVICE_INFO_PATH: &str = "/device/getParam";
pub const DEVICE_TYPES_PATH: &str = "/device/getType";

pub struct Lookups {
    http: reqwest::Client,
    base_url: String,
    locale: String,
}

impl Lookups {
    /// Build the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_timeouts(
            config.http_base_url(),
            config.locale.clone(),
            config.http_timeouts.request(),
            config.http_timeouts.connect(),
        )
    }

    fn with_timeouts(
        base_url: String,
        locale: String,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), locale })
    }

    /// Static device metadata.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn about(&self) -> Result<Value, ClientError> {
        self.get(ABOUT_PATH, &[("lang", self.locale.as_str())]).await
    }

    /// Product listing.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn products(&self) -> Result<Value, ClientError> {
        self.get(PRODUCTS_PATH, &[("lang", self.locale.as_str())]).await
    }

    /// Parameters of one device.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn device_info(&self, token: &str, dev_id: u32) -> Result<Value, ClientError> {
        let dev_id = dev_id.to_string();
        self.get(DEVICE_INFO_PATH, &[("lang", self.locale.as_str()), ("token", token), ("dev_id", dev_id.as_str())])
            .await
    }

    /// Catalog of device types the unit knows about.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn device_types(&self, token: &str) -> Result<Value, ClientError> {
        self.get(DEVICE_TYPES_PATH, &[("lang", self.locale.as_str()), ("token", token)]).await
    }

    #[instrument(skip(self, query))]
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "lookup: GET");

        let text = self
            .http
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let reply = envelope::decode_reply(&text)?;
        Ok(reply.into_result()?)
    }
}

#[cfg(test)]
#[path = "lookup_test.rs"]
mod tests;
