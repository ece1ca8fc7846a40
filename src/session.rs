//! Session token and locale.
//!
//! The token starts empty and is replaced only by a successful `connect`
//! handshake. Every other request carries it verbatim, empty or not.

use serde_json::Value;

use crate::envelope::{FIELD_TOKEN, Payload};

/// Service name of the session handshake.
pub const HANDSHAKE_SERVICE: &str = "connect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    locale: String,
}

impl Session {
    #[must_use]
    pub fn new(locale: impl Into<String>) -> Self {
        Self { token: String::new(), locale: locale.into() }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Adopt the token from a handshake reply's `result_data`.
    ///
    /// Returns `false` and keeps the current token when the reply has no
    /// string `token` field.
    pub fn apply_handshake(&mut self, result_data: &Value) -> bool {
        let Some(token) = result_data.get(FIELD_TOKEN).and_then(Value::as_str) else {
            return false;
        };
        token.clone_into(&mut self.token);
        true
    }

    /// Payload for the handshake: an empty token.
    #[must_use]
    pub fn handshake_payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert(FIELD_TOKEN.to_owned(), Value::String(String::new()));
        payload
    }

    /// Payload carrying the current token, ready for operation fields.
    #[must_use]
    pub fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(FIELD_TOKEN.to_owned(), Value::String(self.token.clone()));
        payload
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
