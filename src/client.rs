//! Device client: the service facade over one connection and session.
//!
//! DESIGN
//! ======
//! Every socket operation is `call(service, payload)`: register the caller
//! under the service name, send the envelope, wait for the reply that names
//! the same service. At most one call per service can be in flight; a second
//! call to a busy service supersedes the first, whose future never completes.
//! Distinct services can be awaited concurrently.
//!
//! The client never times out and never reconnects. After a disconnect the
//! owner must `connect()` and `authenticate()` again; calls left pending on
//! the old link stay pending.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::envelope::{self, Payload};
use crate::error::ClientError;
use crate::lookup::Lookups;
use crate::registry::PendingCalls;
use crate::session::{HANDSHAKE_SERVICE, Session};

// =============================================================================
// SERVICE NAMES
// =============================================================================

pub const SERVICE_STATE: &str = "state";
pub const SERVICE_RUNTIME: &str = "runtime";
pub const SERVICE_STATISTICS: &str = "statistics";
pub const SERVICE_DEVICE_LIST: &str = "devicelist";
pub const SERVICE_REALTIME: &str = "real";
pub const SERVICE_DC: &str = "direct";
pub const SERVICE_FAULT: &str = "fault";
pub const SERVICE_LOCAL: &str = "local";

/// Device type filter sent by `devicelist` when none is given.
pub const DEFAULT_DEVICE_TYPE: u32 = 0;

// =============================================================================
// CLIENT
// =============================================================================

pub struct WinetClient {
    config: ClientConfig,
    registry: Arc<PendingCalls>,
    connection: Connection,
    session: RwLock<Session>,
    lookups: Lookups,
}

impl WinetClient {
    /// Create a disconnected client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the lookup HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let registry = Arc::new(PendingCalls::new());
        let connection = Connection::new(config.ws_url(), Arc::clone(&registry));
        let session = RwLock::new(Session::new(config.locale.clone()));
        let lookups = Lookups::new(&config)?;
        Ok(Self { config, registry, connection, session, lookups })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn pending_calls(&self) -> &PendingCalls {
        &self.registry
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Start opening the socket; watch [`Self::subscribe`] for the outcome.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the socket, best effort. Pending calls are not failed.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Current session token; empty until [`Self::authenticate`] succeeds.
    pub async fn token(&self) -> String {
        self.session.read().await.token().to_owned()
    }

    /// Run the `connect` handshake and adopt the token it returns.
    ///
    /// # Errors
    ///
    /// Returns the call's error, or [`ClientError::MissingField`] when the
    /// reply carries no token. The current token is kept on failure.
    ///
    /// This differs from the device protocol, which treats a success reply
    /// without a token as a successful handshake.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        let data = self.call(HANDSHAKE_SERVICE, Session::handshake_payload()).await?;
        if !self.session.write().await.apply_handshake(&data) {
            return Err(ClientError::MissingField("token"));
        }
        info!("client: authenticated");
        Ok(())
    }

    // =========================================================================
    // Core call
    // =========================================================================

    /// Send `payload` to `service` and wait for the reply naming it.
    ///
    /// Waits without limit. Calling a service that already has a call in
    /// flight supersedes that call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the socket is not open and
    /// [`ClientError::Service`] when the device answers with a failure code.
    pub async fn call(&self, service: &str, payload: Payload) -> Result<Value, ClientError> {
        let locale = self.session.read().await.locale().to_owned();
        let text = envelope::encode_request(&locale, service, &payload);

        let (ticket, pending) = self.registry.register(service);
        if let Err(e) = self.connection.send(text).await {
            self.registry.withdraw(service, ticket);
            return Err(e.into());
        }
        debug!(%service, "client: request sent");

        Ok(pending.wait().await?)
    }

    async fn call_with_token(&self, service: &str, fields: Payload) -> Result<Value, ClientError> {
        let mut payload = self.session.read().await.payload();
        payload.extend(fields);
        self.call(service, payload).await
    }

    // =========================================================================
    // Socket services
    // =========================================================================

    /// Plant overview.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_state(&self) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_STATE, Payload::new()).await
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_runtime(&self) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_RUNTIME, Payload::new()).await
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_statistics(&self) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_STATISTICS, Payload::new()).await
    }

    /// Devices attached to the unit, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_device_list(&self, device_type: Option<u32>) -> Result<Value, ClientError> {
        let mut fields = Payload::new();
        fields.insert("type".to_owned(), Value::from(device_type.unwrap_or(DEFAULT_DEVICE_TYPE)));
        fields.insert("is_check_token".to_owned(), Value::from("0"));
        self.call_with_token(SERVICE_DEVICE_LIST, fields).await
    }

    /// Realtime measurements of one device.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_device_realtime_data(&self, dev_id: u32) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_REALTIME, device_fields(dev_id)).await
    }

    /// DC (string/MPPT) measurements of one device.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_device_dc_data(&self, dev_id: u32) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_DC, device_fields(dev_id)).await
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_faults(&self) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_FAULT, Payload::new()).await
    }

    /// Local system information of the communication unit.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_system_information(&self) -> Result<Value, ClientError> {
        self.call_with_token(SERVICE_LOCAL, Payload::new()).await
    }

    // =========================================================================
    // Plain lookups
    // =========================================================================

    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn get_about(&self) -> Result<Value, ClientError> {
        self.lookups.about().await
    }

    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn get_products(&self) -> Result<Value, ClientError> {
        self.lookups.products().await
    }

    /// Device parameters, authenticated with the current session token.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn get_device_info(&self, dev_id: u32) -> Result<Value, ClientError> {
        let token = self.token().await;
        self.lookups.device_info(&token, dev_id).await
    }

    /// Device type catalog, authenticated with the current session token.
    ///
    /// # Errors
    ///
    /// Returns HTTP, envelope, or service errors.
    pub async fn get_device_types(&self) -> Result<Value, ClientError> {
        let token = self.token().await;
        self.lookups.device_types(&token).await
    }
}

fn device_fields(dev_id: u32) -> Payload {
    let mut fields = Payload::new();
    fields.insert("dev_id".to_owned(), Value::from(dev_id));
    fields
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
