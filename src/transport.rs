//! Delivery of outbound messages to workers.
//!
//! The coordinator only ever hands a message and a recipient to a
//! [`Transport`]. Delivery is fire-and-forget; failures are the transport's
//! business and never reach the coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::engine::Inbound;
use crate::model::{Outbound, WorkerId};

/// Something that can deliver a payload of any size to a named worker.
pub trait Transport {
    /// Hand `message` off for delivery to `recipient`.
    fn send(&self, recipient: WorkerId, message: Outbound);

    /// Forget a worker that is known to be gone.
    fn disconnect(&self, _recipient: WorkerId) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, recipient: WorkerId, message: Outbound) {
        (**self).send(recipient, message);
    }

    fn disconnect(&self, recipient: WorkerId) {
        (**self).disconnect(recipient);
    }
}

// ---------------------------------------------------------------------------
// In-process channels
// ---------------------------------------------------------------------------

/// In-process transport over one unbounded tokio channel per worker.
///
/// Cloning shares the same routing table, so the side that spawns workers
/// and the coordinator can each hold a handle.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    routes: Arc<Mutex<HashMap<WorkerId, Route>>>,
}

/// Sending half of a worker's channel plus the means to stop its watcher.
struct Route {
    tx: mpsc::UnboundedSender<Outbound>,
    cancel: oneshot::Sender<()>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a route to `id` and return the worker's end of it.
    ///
    /// A watcher task posts [`Inbound::WorkerLost`] on `inbound` once the
    /// worker drops its receiver, which is how the coordinator learns that a
    /// worker is gone. [`Transport::disconnect`] stops the watcher without
    /// posting, and the worker's receiver then yields `None`. Connecting an
    /// id that already has a route replaces it. Must be called from within a
    /// tokio runtime.
    pub fn connect(
        &self,
        id: WorkerId,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel, cancelled) = oneshot::channel();
        let watched = tx.clone();
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(id, Route { tx, cancel });
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = watched.closed() => {
                    debug!(worker = %id, "worker channel closed");
                    let _ = inbound.send(Inbound::WorkerLost(id));
                }
                _ = cancelled => {
                    debug!(worker = %id, "route disconnected");
                }
            }
        });
        rx
    }

    pub fn is_connected(&self, id: WorkerId) -> bool {
        self.routes
            .lock()
            .map(|routes| routes.get(&id).is_some_and(|route| !route.tx.is_closed()))
            .unwrap_or(false)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, recipient: WorkerId, message: Outbound) {
        let Ok(routes) = self.routes.lock() else {
            warn!(worker = %recipient, "routing table poisoned, dropping message");
            return;
        };
        match routes.get(&recipient) {
            Some(route) => {
                if route.tx.send(message).is_err() {
                    warn!(worker = %recipient, "worker channel closed, message dropped");
                }
            }
            None => warn!(worker = %recipient, "no route to worker, message dropped"),
        }
    }

    /// Drop the route to `recipient`. Once the watcher has stopped, the last
    /// sender is gone and the worker's channel closes.
    fn disconnect(&self, recipient: WorkerId) {
        let route = match self.routes.lock() {
            Ok(mut routes) => routes.remove(&recipient),
            Err(_) => None,
        };
        if let Some(route) = route {
            let _ = route.cancel.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Recording (tests, dry runs)
// ---------------------------------------------------------------------------

/// Transport that keeps every message it is given, in order.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(WorkerId, Outbound)>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<(WorkerId, Outbound)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Only the chunks sent to `worker`, as record lists.
    pub fn chunks_for(&self, worker: WorkerId) -> Vec<Vec<crate::model::Record>> {
        self.sent()
            .into_iter()
            .filter_map(|(to, msg)| match msg {
                Outbound::Chunk { records } if to == worker => Some(records),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Transport for RecordingTransport {
    fn send(&self, recipient: WorkerId, message: Outbound) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient, message));
        }
    }
}
