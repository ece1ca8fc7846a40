//! Persistent websocket to the device.
//!
//! DESIGN
//! ======
//! `connect()` returns immediately and spawns one link task that owns the
//! socket. Callers write through a bounded command channel; the link task
//! reads inbound frames and routes each one to the pending call registry by
//! the service name inside `result_data`.
//!
//! LIFECYCLE
//! =========
//! `Disconnected --connect()--> Connecting --open--> Connected`, and back to
//! `Disconnected` on peer close, transport error, or `disconnect()`. Every
//! transition is mirrored on a `watch` channel and announced as a
//! [`ConnectionEvent`] on a broadcast channel. There is no reconnection, and
//! losing the link does not fail pending calls.
//!
//! Each link carries an epoch. `disconnect()` bumps the epoch, so a link
//! that is still winding down can no longer report transitions for a newer
//! connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::envelope;
use crate::error::{EnvelopeError, TransportError};
use crate::registry::PendingCalls;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 32;

// =============================================================================
// STATE AND EVENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle notification delivered to subscribers.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// The websocket handshake completed.
    Connected,
    /// The link closed, from either side.
    Disconnected,
    /// A transport failure; always followed by `Disconnected`.
    Error(Arc<TransportError>),
}

/// What became of one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Handed to the caller waiting on this service.
    Delivered(String),
    /// Names a service nobody is waiting on.
    Unmatched(String),
    /// Undecodable, or names no service.
    Dropped,
}

enum Command {
    Frame(String),
    Close,
}

struct Link {
    epoch: u64,
    commands: Option<mpsc::Sender<Command>>,
}

struct Shared {
    registry: Arc<PendingCalls>,
    link: Mutex<Link>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Mark the link for `epoch` open. Returns `false` if it was abandoned.
    fn opened(&self, epoch: u64) -> bool {
        let link = self.lock();
        if link.epoch != epoch {
            return false;
        }
        self.state.send_replace(ConnectionState::Connected);
        self.emit(ConnectionEvent::Connected);
        true
    }

    /// Mark the link for `epoch` closed, reporting `error` first if any.
    fn closed(&self, epoch: u64, error: Option<TransportError>) {
        let mut link = self.lock();
        if link.epoch != epoch {
            return;
        }
        link.commands = None;
        if let Some(error) = error {
            warn!(error = %error, "connection: transport error");
            self.emit(ConnectionEvent::Error(Arc::new(error)));
        }
        self.state.send_replace(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Disconnected);
        info!("connection: disconnected");
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Owner of the device websocket.
pub struct Connection {
    url: String,
    shared: Arc<Shared>,
}

impl Connection {
    #[must_use]
    pub fn new(url: impl Into<String>, registry: Arc<PendingCalls>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Shared { registry, link: Mutex::new(Link { epoch: 0, commands: None }), state, events };
        Self { url: url.into(), shared: Arc::new(shared) }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to lifecycle events. Events emitted before subscribing are not replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Start opening the websocket. No-op unless disconnected.
    ///
    /// Must be called from within a tokio runtime; the outcome arrives as a
    /// [`ConnectionEvent`].
    pub fn connect(&self) {
        let (epoch, commands) = {
            let mut link = self.shared.lock();
            if self.shared.current_state() != ConnectionState::Disconnected {
                debug!(url = %self.url, "connection: connect ignored, link already live");
                return;
            }
            link.epoch += 1;
            let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
            link.commands = Some(tx);
            self.shared.state.send_replace(ConnectionState::Connecting);
            (link.epoch, rx)
        };

        info!(url = %self.url, "connection: connecting");
        tokio::spawn(run_link(Arc::clone(&self.shared), epoch, self.url.clone(), commands));
    }

    /// Close the websocket, best effort. Pending calls stay pending.
    pub fn disconnect(&self) {
        let commands = {
            let mut link = self.shared.lock();
            let Some(commands) = link.commands.take() else {
                return;
            };
            link.epoch += 1;
            self.shared.state.send_replace(ConnectionState::Disconnected);
            self.shared.emit(ConnectionEvent::Disconnected);
            commands
        };

        // The link also stops once every sender is gone.
        let _ = commands.try_send(Command::Close);
        info!(url = %self.url, "connection: disconnect requested");
    }

    /// Write one frame to the device.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] unless the link is open.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        let commands = {
            let link = self.shared.lock();
            if self.shared.current_state() != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            link.commands.clone().ok_or(TransportError::NotConnected)?
        };

        commands
            .send(Command::Frame(text))
            .await
            .map_err(|_| TransportError::NotConnected)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// =============================================================================
// LINK TASK
// =============================================================================

async fn run_link(shared: Arc<Shared>, epoch: u64, url: String, mut commands: mpsc::Receiver<Command>) {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = commands.recv() => {
            debug!(%url, "connection: handshake abandoned");
            return;
        }
    };

    let mut stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            shared.closed(epoch, Some(TransportError::Connect(Box::new(e))));
            return;
        }
    };

    if !shared.opened(epoch) {
        let _ = stream.close(None).await;
        return;
    }
    info!(%url, "connection: connected");

    let (mut sink, mut source) = stream.split();
    let outcome = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        break Err(TransportError::Socket(Box::new(e)));
                    }
                }
                Some(Command::Close) | None => {
                    // Close is advisory; the peer may already be gone.
                    let _ = sink.close().await;
                    break Ok(());
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => note_routed(&route_frame(&shared.registry, text.as_str())),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => note_routed(&route_frame(&shared.registry, text)),
                    Err(_) => debug!(len = bytes.len(), "connection: dropped non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(TransportError::Socket(Box::new(e))),
            },
        }
    };

    shared.closed(epoch, outcome.err());
}

// =============================================================================
// ROUTING
// =============================================================================

/// Route one inbound frame to the caller waiting on its service.
pub(crate) fn route_frame(registry: &PendingCalls, text: &str) -> Routed {
    let (service, reply) = match envelope::decode_frame(text) {
        Ok(decoded) => decoded,
        Err(EnvelopeError::MissingService) => {
            debug!("connection: dropped frame without service");
            return Routed::Dropped;
        }
        Err(e) => {
            warn!(error = %e, "connection: dropped undecodable frame");
            return Routed::Dropped;
        }
    };

    if registry.dispatch(&service, reply) {
        Routed::Delivered(service)
    } else {
        Routed::Unmatched(service)
    }
}

fn note_routed(routed: &Routed) {
    match routed {
        Routed::Delivered(service) => debug!(%service, "connection: reply delivered"),
        Routed::Unmatched(service) => debug!(%service, "connection: reply matched no pending call"),
        Routed::Dropped => {}
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
