//! Call correlation.
//!
//! Every outgoing request gets a fresh token and a slot in the pending table.
//! The connection's reader task hands each inbound frame to
//! [`Dispatcher::route`], which resolves the matching slot or, when nothing
//! matches, publishes the frame as a [`Notification`].

use crate::error::ClientError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surrealdb_rpc_protocol::{Incoming, Notification, Payload, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

type Slot = oneshot::Sender<Result<Value, ClientError>>;

/// Produces the error handed to callers once the table is closed.
pub type ShutdownError = fn() -> ClientError;

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, Slot>,
    closed: Option<ShutdownError>,
}

/// Routes responses to waiting callers.
pub struct Dispatcher {
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    notifications: broadcast::Sender<Notification>,
}

impl Dispatcher {
    /// Creates a dispatcher whose notification channel buffers `capacity`
    /// messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity.max(1));
        Self {
            pending: Arc::new(Mutex::new(PendingTable::default())),
            next_id: AtomicU64::new(1),
            notifications,
        }
    }

    /// Allocates a token and registers a slot for its response.
    pub fn register(&self) -> Result<PendingCall, ClientError> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.pending.lock();
        if let Some(error) = table.closed {
            return Err(error());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        table.calls.insert(id, tx);
        drop(table);

        Ok(PendingCall {
            id,
            rx,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Routes one inbound frame.
    pub fn route(&self, frame: &[u8]) {
        let incoming = match Incoming::decode(frame) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping undecodable frame");
                return;
            }
        };

        let slot = incoming
            .id
            .and_then(|id| self.pending.lock().calls.remove(&id));

        match slot {
            Some(tx) => {
                let result = match incoming.payload {
                    Ok(Payload::Result(value)) => Ok(value),
                    Ok(Payload::Error(e)) => Err(ClientError::Server {
                        code: e.code,
                        message: e.message,
                    }),
                    Err(e) => Err(ClientError::Protocol(e)),
                };
                if tx.send(result).is_err() {
                    trace!(id = ?incoming.id, "caller went away before its response");
                }
            }
            None => match incoming.payload {
                Ok(Payload::Result(payload)) => self.notify(Notification {
                    id: incoming.id,
                    payload,
                }),
                Ok(Payload::Error(e)) => {
                    warn!(id = ?incoming.id, code = %e.code, message = %e.message, "error for unknown call");
                }
                Err(e) => {
                    warn!(id = ?incoming.id, error = %e, "dropping malformed notification");
                }
            },
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            trace!("no notification subscribers, dropping");
        }
    }

    /// Resolves every pending call with `error` and refuses new ones.
    pub fn shutdown(&self, error: ShutdownError) {
        let calls = {
            let mut table = self.pending.lock();
            table.closed.get_or_insert(error);
            std::mem::take(&mut table.calls)
        };

        if !calls.is_empty() {
            debug!(count = calls.len(), error = %error(), "failing pending calls");
        }
        for (_, tx) in calls {
            let _ = tx.send(Err(error()));
        }
    }

    /// Subscribes to notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Returns the number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().calls.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed.is_some()
    }
}

/// A registered call awaiting its response.
///
/// Dropping it, resolved or not, removes its slot from the table.
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
    pending: Arc<Mutex<PendingTable>>,
}

impl PendingCall {
    /// The correlation token to put on the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the response, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value, ClientError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!(id = self.id, ?timeout, "call timed out");
                Err(ClientError::Timeout)
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.pending.lock().calls.remove(&self.id);
    }
}
