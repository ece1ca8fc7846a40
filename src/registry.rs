//! Pending call registry.
//!
//! DESIGN
//! ======
//! Replies carry no request id, only the service name they answer, so the
//! registry holds at most one waiting caller per service. Registering a
//! second call for a busy service supersedes the first: the earlier handle is
//! dropped and its caller never settles. Callers that need two answers from
//! the same service must issue the calls one after the other.
//!
//! Every registration gets a [`Ticket`] so a caller whose send failed can
//! withdraw its own entry without touching one that superseded it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::envelope::Reply;
use crate::error::ServiceError;

/// Identifies one registration of a service name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u64);

struct Entry {
    ticket: Ticket,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_ticket: u64,
}

/// Map of service name to the single caller waiting on it.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<Inner>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the waiting caller for `service`, superseding any earlier one.
    pub fn register(&self, service: &str) -> (Ticket, PendingReply) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.next_ticket += 1;
        let ticket = Ticket(inner.next_ticket);

        let previous = inner.entries.insert(service.to_owned(), Entry { ticket, tx });
        if let Some(previous) = previous {
            debug!(%service, superseded = previous.ticket.0, "registry: call superseded");
        }

        (ticket, PendingReply { rx })
    }

    /// Hand `reply` to the caller waiting on `service` and clear the entry.
    ///
    /// Returns `false` when nobody was waiting.
    pub fn dispatch(&self, service: &str, reply: Reply) -> bool {
        let entry = self.lock().entries.remove(service);
        let Some(entry) = entry else {
            return false;
        };
        entry.tx.send(reply).is_ok()
    }

    /// Remove the entry for `service` if it still belongs to `ticket`.
    pub fn withdraw(&self, service: &str, ticket: Ticket) -> bool {
        let mut inner = self.lock();
        if inner.entries.get(service).is_some_and(|entry| entry.ticket == ticket) {
            inner.entries.remove(service);
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_pending(&self, service: &str) -> bool {
        self.lock().entries.contains_key(service)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caller's side of a registration.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// Wait for the reply naming this call's service.
    ///
    /// There is no timeout. A superseded or withdrawn call never completes;
    /// wrap the future in `tokio::time::timeout` to bound the wait.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the reply carries a failure code.
    pub async fn wait(self) -> Result<Value, ServiceError> {
        match self.rx.await {
            Ok(reply) => reply.into_result(),
            Err(_) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
