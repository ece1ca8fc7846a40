//! Service envelope codec.
//!
//! DESIGN
//! ======
//! Requests are flat JSON objects: `lang`, `service` and the operation
//! fields side by side. Replies wrap the payload as
//! `{result_code, result_msg, result_data}` and name their service inside
//! `result_data`, which is the only correlation key the protocol offers.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{EnvelopeError, ServiceError};

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Request key carrying the locale.
pub const FIELD_LANG: &str = "lang";

/// Request and reply-data key naming the service.
pub const FIELD_SERVICE: &str = "service";

/// Payload key carrying the session token.
pub const FIELD_TOKEN: &str = "token";

/// The `result_code` value that marks success.
pub const RESULT_OK: i64 = 1;

/// Flat request payload.
pub type Payload = Map<String, Value>;

// =============================================================================
// OUTBOUND
// =============================================================================

/// Encode a request envelope for `service`.
///
/// Payload fields are merged over `lang` and `service`, so a payload that
/// carries either key overrides the envelope value.
#[must_use]
pub fn encode_request(locale: &str, service: &str, payload: &Payload) -> String {
    let mut envelope = Map::with_capacity(payload.len() + 2);
    envelope.insert(FIELD_LANG.to_owned(), Value::String(locale.to_owned()));
    envelope.insert(FIELD_SERVICE.to_owned(), Value::String(service.to_owned()));
    for (key, value) in payload {
        envelope.insert(key.clone(), value.clone());
    }
    Value::Object(envelope).to_string()
}

// =============================================================================
// INBOUND
// =============================================================================

/// A decoded reply envelope.
///
/// Only `result_data.service` is needed to route a reply, so the other
/// fields decode leniently: a missing or non-integer `result_code` reads as
/// `None` (a failure) and a missing or null `result_msg` as empty.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Reply {
    #[serde(default, deserialize_with = "lenient_code")]
    pub result_code: Option<i64>,
    #[serde(default, deserialize_with = "lenient_msg")]
    pub result_msg: String,
    #[serde(default)]
    pub result_data: Option<Value>,
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_i64())
}

fn lenient_msg<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(msg) => msg,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl Reply {
    /// Service name the reply answers, from `result_data.service`.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.result_data
            .as_ref()
            .and_then(|data| data.get(FIELD_SERVICE))
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code == Some(RESULT_OK)
    }

    /// Resolve the reply into its data or the device's failure message.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when `result_code` is anything but [`RESULT_OK`],
    /// including absent.
    pub fn into_result(self) -> Result<Value, ServiceError> {
        if !self.is_success() {
            return Err(ServiceError { code: self.result_code, message: self.result_msg });
        }
        Ok(self.result_data.unwrap_or(Value::Null))
    }
}

/// Decode one reply envelope from text.
///
/// # Errors
///
/// Returns [`EnvelopeError::Decode`] when the text is not a JSON object.
pub fn decode_reply(text: &str) -> Result<Reply, EnvelopeError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a socket frame and extract its correlation key.
///
/// # Errors
///
/// Returns [`EnvelopeError::MissingService`] for replies that name no service.
pub fn decode_frame(text: &str) -> Result<(String, Reply), EnvelopeError> {
    let reply = decode_reply(text)?;
    let service = reply.service().ok_or(EnvelopeError::MissingService)?.to_owned();
    Ok((service, reply))
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
