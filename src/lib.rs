//! Client for the WiNet device telemetry API.
//!
//! The device exposes one persistent websocket at `/ws/home/overview` that
//! carries JSON request/response envelopes keyed by service name, plus a few
//! plain HTTP lookups.
//!
//! # Example
//!
//! ```rust,no_run
//! use winet::{ClientConfig, ConnectionEvent, WinetClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WinetClient::new(ClientConfig::new("192.168.1.20"))?;
//! let mut events = client.subscribe();
//! client.connect();
//!
//! if let ConnectionEvent::Connected = events.recv().await? {
//!     client.authenticate().await?;
//!     let state = client.get_state().await?;
//!     println!("{state}");
//! }
//! client.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! # Correlation
//!
//! Replies carry no request id, only the service they answer. The client
//! therefore allows one in-flight call per service; a second call to the same
//! service supersedes the first, which then never completes. Nothing times
//! out inside the client: bound waits with `tokio::time::timeout`.

mod client;
pub mod config;
pub mod connection;
pub mod envelope;
mod error;
pub mod lookup;
pub mod registry;
pub mod session;

pub use client::*;
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use envelope::Payload;
pub use error::{ClientError, ConfigError, EnvelopeError, ServiceError, TransportError};
pub use registry::{PendingCalls, PendingReply};
pub use session::Session;
