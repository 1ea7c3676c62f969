//! Control plane: reads input, feeds the coordinator, reacts to workers.
//!
//! All coordinator state is touched from one loop that takes inbound
//! messages off a single FIFO, one at a time, in arrival order.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::coordinator::{BatchOutcome, Coordinator};
use crate::error::Result;
use crate::model::{Record, WorkerId};
use crate::source::RecordSource;
use crate::transport::Transport;

/// Messages the control plane reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The record source answered a read request.
    BatchArrived(Vec<Record>),
    /// A worker registered.
    WorkerJoined(WorkerId),
    /// A worker's liveness was lost.
    WorkerLost(WorkerId),
    /// A worker finished `count` of the items it was sent.
    ChunkCompleted { worker: WorkerId, count: usize },
    /// Run an admission tick.
    Tick,
}

/// Configuration for the control plane.
#[derive(Debug, Clone, Default)]
pub struct ControlConfig {
    /// Stop once input is exhausted and no work is left anywhere.
    pub exit_when_drained: bool,
}

/// Cloneable handle for talking to a running control plane.
#[derive(Clone)]
pub struct ControlHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    shutdown: Arc<Notify>,
}

impl ControlHandle {
    /// Queue a message for the control plane.
    pub fn send(&self, msg: Inbound) {
        if self.inbound.send(msg).is_err() {
            debug!("control plane gone, message dropped");
        }
    }

    pub fn worker_joined(&self, id: WorkerId) {
        self.send(Inbound::WorkerJoined(id));
    }

    pub fn worker_lost(&self, id: WorkerId) {
        self.send(Inbound::WorkerLost(id));
    }

    pub fn chunk_completed(&self, worker: WorkerId, count: usize) {
        self.send(Inbound::ChunkCompleted { worker, count });
    }

    /// The raw sender, for transports that post liveness signals.
    pub fn inbound(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound.clone()
    }

    /// Signal the control plane to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// The control plane loop around one coordinator.
pub struct ControlPlane<T: Transport> {
    coordinator: Coordinator<T>,
    config: ControlConfig,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    shutdown: Arc<Notify>,
}

impl<T: Transport> ControlPlane<T> {
    pub fn new(coordinator: Coordinator<T>, config: ControlConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            coordinator,
            config,
            inbound_tx,
            inbound_rx,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            inbound: self.inbound_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Run until shutdown (or until drained, if configured) and hand the
    /// coordinator back.
    ///
    /// The source is read on its own task. Exactly one read request is
    /// outstanding at a time; the next is issued only once the previous
    /// batch has come back, and none after end-of-input.
    pub async fn run<S: RecordSource>(mut self, source: S) -> Result<Coordinator<T>> {
        let reads = spawn_reader(source, self.inbound_tx.clone());
        request_batch(&reads);

        info!(
            admission_cap = self.coordinator.admission_cap(),
            "control plane started"
        );

        loop {
            let msg = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("control plane shutting down");
                    break;
                }
                msg = self.inbound_rx.recv() => msg,
            };
            let Some(msg) = msg else {
                break;
            };

            if let Err(e) = self.handle_message(msg, &reads) {
                error!("inbound message error: {e}");
            }

            if self.config.exit_when_drained && self.coordinator.is_drained() {
                info!("all work drained, control plane stopping");
                break;
            }
        }

        let s = self.coordinator.snapshot();
        info!(
            workers = s.workers,
            pending = s.pending,
            working = s.working,
            buffered = s.buffered,
            "control plane stopped"
        );
        Ok(self.coordinator)
    }

    fn handle_message(&mut self, msg: Inbound, reads: &mpsc::Sender<()>) -> Result<()> {
        match msg {
            Inbound::BatchArrived(records) => {
                debug!(records = records.len(), "batch arrived");
                // Issued before ingest: an ingest error must not end the input.
                if !records.is_empty() {
                    request_batch(reads);
                }
                match self.coordinator.ingest(records)? {
                    BatchOutcome::Continue => {}
                    BatchOutcome::EndOfInput => info!("no more input"),
                }
                Ok(())
            }
            Inbound::WorkerJoined(id) => self.coordinator.worker_joined(id),
            Inbound::WorkerLost(id) => self.coordinator.worker_lost(id),
            Inbound::ChunkCompleted { worker, count } => {
                self.coordinator.chunk_completed(worker, count)
            }
            Inbound::Tick => {
                self.coordinator.tick();
                Ok(())
            }
        }
    }
}

fn request_batch(reads: &mpsc::Sender<()>) {
    if let Err(e) = reads.try_send(()) {
        warn!("read request not queued: {e}");
    }
}

/// Spawn the reader task. Each `()` on the returned sender is one read
/// request; the reply comes back as [`Inbound::BatchArrived`].
fn spawn_reader<S: RecordSource>(
    mut source: S,
    inbound: mpsc::UnboundedSender<Inbound>,
) -> mpsc::Sender<()> {
    let (tx, mut rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let batch = match source.next_batch().await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("record source failed, treating as end of input: {e}");
                    Vec::new()
                }
            };
            let done = batch.is_empty();
            if inbound.send(Inbound::BatchArrived(batch)).is_err() || done {
                break;
            }
        }
    });
    tx
}
