//! Error taxonomy for the device client.
//!
//! DESIGN
//! ======
//! Transport failures belong to the connection and are broadcast as lifecycle
//! events; service failures belong to exactly one caller. Envelope errors are
//! protocol noise on the socket (logged and dropped) but a real answer when
//! they come back from a direct HTTP lookup.

/// Connection-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The websocket handshake with the device failed.
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    /// Reading from or writing to an open websocket failed.
    #[error("websocket i/o failed: {0}")]
    Socket(Box<tokio_tungstenite::tungstenite::Error>),
    /// A frame was sent while the connection was not open.
    #[error("not connected")]
    NotConnected,
}

/// A reply whose `result_code` was not the success code.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    /// The `result_code` carried by the reply, if it was an integer.
    pub code: Option<i64>,
    /// The `result_msg` carried by the reply, verbatim.
    pub message: String,
}

/// A frame that does not follow the service envelope shape.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not a JSON object.
    #[error("envelope decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// The frame decoded but `result_data.service` is absent.
    #[error("envelope has no result_data.service")]
    MissingService,
}

/// Error returned by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The socket could not carry the request.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The device answered with a failure code.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// A lookup response was not a service envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// An HTTP lookup request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// A required field was absent from a successful reply.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
}

/// Configuration could not be assembled.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required env var {0}")]
    MissingVar(&'static str),
    /// An environment variable holds a value that does not parse.
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}
