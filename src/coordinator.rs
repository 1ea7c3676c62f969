//! The coordinator: owns the registry and buffer and reacts to ingestion,
//! membership and completion one step at a time.
//!
//! Every public handler runs to completion before the next one may be
//! called (`&mut self`), which is the only synchronization the registry
//! needs. Handlers never leave the registry half-updated: a distribution
//! pass that fails its postcondition is aborted before anything moves.

use opentelemetry::KeyValue;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionController, Dispatch};
use crate::balance::{self, Assignment};
use crate::error::Result;
use crate::event::{Event, EventKind, Journal};
use crate::membership::{self, MemberState, MembershipTracker};
use crate::model::{Outbound, Record, WorkerId};
use crate::registry::{PendingBuffer, WorkQueueRegistry};
use crate::telemetry::dispatch::{record_pass_result, start_pass_span};
use crate::telemetry::metrics;
use crate::transport::Transport;

/// What the caller should do after handing over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Records were taken in; ask the source for the next batch.
    Continue,
    /// The batch was empty: the source has nothing more.
    EndOfInput,
}

/// Counts describing the coordinator at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub workers: usize,
    pub pending: usize,
    pub working: usize,
    pub buffered: usize,
}

pub struct Coordinator<T: Transport> {
    registry: WorkQueueRegistry,
    buffer: PendingBuffer,
    members: MembershipTracker,
    admission: AdmissionController,
    transport: T,
    welcome: Option<serde_json::Value>,
    journal: Journal,
    input_exhausted: bool,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, admission_cap: usize) -> Self {
        Self {
            registry: WorkQueueRegistry::new(),
            buffer: PendingBuffer::new(),
            members: MembershipTracker::new(),
            admission: AdmissionController::new(admission_cap),
            transport,
            welcome: None,
            journal: Journal::new(),
            input_exhausted: false,
        }
    }

    /// Payload sent once to every worker when it registers.
    pub fn with_welcome(mut self, data: serde_json::Value) -> Self {
        self.welcome = Some(data);
        self
    }

    /// Keep at most `capacity` journal events.
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal = Journal::with_capacity(capacity);
        self
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Take in one batch from the record source.
    ///
    /// An empty batch means end-of-input. Otherwise the records are spread
    /// over the registered workers (or buffered if there are none) and a
    /// dispatch tick runs.
    pub fn ingest(&mut self, records: Vec<Record>) -> Result<BatchOutcome> {
        if records.is_empty() {
            if !self.input_exhausted {
                info!("input exhausted");
                self.input_exhausted = true;
                self.journal.record(EventKind::InputExhausted);
            }
            return Ok(BatchOutcome::EndOfInput);
        }

        let span = start_pass_span("ingest", records.len());
        let _enter = span.enter();

        let count = records.len();
        metrics::records_ingested().add(count as u64, &[]);
        self.journal
            .record(EventKind::BatchIngested { records: count });

        let assigned = self.distribute_work(records)?;
        let dispatched = self.push_work();
        record_pass_result(&span, assigned, dispatched);
        Ok(BatchOutcome::Continue)
    }

    /// Place new records into worker queues, or into the buffer while no
    /// worker is registered. Returns how many records went to workers.
    fn distribute_work(&mut self, records: Vec<Record>) -> Result<usize> {
        for id in self.members.live() {
            self.registry.ensure_worker(id);
        }

        if self.registry.is_empty() {
            let count = records.len();
            self.buffer.extend(records);
            debug!(count, buffered = self.buffer.len(), "no workers, buffering records");
            metrics::records_buffered().add(count as u64, &[]);
            self.journal.record(EventKind::RecordsBuffered {
                records: count,
                buffered_total: self.buffer.len(),
            });
            return Ok(0);
        }

        let assignments = match balance::plan(&self.registry.loads(), records.len()) {
            Ok(assignments) => assignments,
            Err(e) => {
                // Unreachable while the registry has entries; `plan` only
                // fails without workers. Nothing was placed; the records are
                // parked and the next join drains them.
                self.buffer.extend(records);
                self.abort_pass(&e);
                return Err(e);
            }
        };
        let count = records.len();
        balance::apply(&mut self.registry, records, &assignments)
            .inspect_err(|e| self.abort_pass(e))?;
        log_assignments(&assignments);
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// A worker has registered.
    ///
    /// It gets the welcome payload, then all unstarted work (including the
    /// buffer) is pulled back and rebalanced so the newcomer gets its share,
    /// then a dispatch tick runs. Repeated joins and joins from terminated
    /// ids are ignored.
    pub fn worker_joined(&mut self, id: WorkerId) -> Result<()> {
        let previous = self.members.join(id);
        if previous != MemberState::Unregistered {
            debug!(worker = %id, state = %previous, "ignoring join");
            self.journal.record(EventKind::JoinIgnored {
                worker: id,
                state: previous.to_string(),
            });
            return Ok(());
        }

        let span = start_pass_span("join", self.buffer.len());
        let _enter = span.enter();

        info!(worker = %id, "registered worker");
        metrics::membership_changes().add(1, &[KeyValue::new("change", "joined")]);
        self.registry.ensure_worker(id);
        self.journal
            .record(EventKind::WorkerRegistered { worker: id });

        if let Some(data) = &self.welcome {
            self.transport
                .send(id, Outbound::Welcome { data: data.clone() });
        }

        let redistribution = membership::reclaim_and_redistribute(
            &mut self.registry,
            &mut self.buffer,
            self.members.live(),
        )
        .inspect_err(|e| self.abort_pass(e))?;
        self.journal.record(EventKind::Redistributed {
            reclaimed: redistribution.reclaimed,
            unbuffered: redistribution.unbuffered,
        });
        log_assignments(&redistribution.assignments);

        let dispatched = self.push_work();
        record_pass_result(
            &span,
            redistribution.reclaimed + redistribution.unbuffered,
            dispatched,
        );
        Ok(())
    }

    /// A worker is gone.
    ///
    /// Its registry entry is deleted. Its pending items were never shipped
    /// and are rebalanced over the remaining workers (or buffered). Its
    /// working items were shipped to a worker that no longer exists; they
    /// are not put back into circulation and are reported as abandoned.
    /// Unknown or already-terminated ids are ignored.
    pub fn worker_lost(&mut self, id: WorkerId) -> Result<()> {
        if !self.members.leave(id) {
            debug!(worker = %id, "liveness lost for unknown worker, ignoring");
            return Ok(());
        }
        self.transport.disconnect(id);
        metrics::membership_changes().add(1, &[KeyValue::new("change", "lost")]);

        let queue = self.registry.remove_worker(id).unwrap_or_default();
        let (working, pending): (Vec<_>, Vec<_>) = queue.into_iter().partition(|wi| wi.working);
        let abandoned = working.len();
        let requeued = pending.len();

        if abandoned > 0 {
            warn!(worker = %id, abandoned, "worker lost with work in flight");
            metrics::items_abandoned().add(abandoned as u64, &[]);
        }
        info!(worker = %id, "unregistered worker");
        self.journal.record(EventKind::WorkerLost {
            worker: id,
            abandoned,
            requeued,
        });

        if !pending.is_empty() {
            let span = start_pass_span("loss", pending.len());
            let _enter = span.enter();
            let records = pending.into_iter().map(|wi| wi.record).collect();
            let assigned = self.distribute_work(records)?;
            let dispatched = self.push_work();
            record_pass_result(&span, assigned, dispatched);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Completion and dispatch
    // -----------------------------------------------------------------------

    /// A worker finished `count` of the items it was sent. The oldest
    /// working items are retired and the worker is topped up again.
    pub fn chunk_completed(&mut self, id: WorkerId, count: usize) -> Result<()> {
        if !self.members.is_live(id) {
            debug!(worker = %id, "completion from unknown worker, ignoring");
            return Ok(());
        }
        let retired = self.registry.retire_working(id, count);
        if retired < count {
            warn!(
                worker = %id,
                reported = count,
                retired,
                "worker reported more completions than it had in flight"
            );
        }
        metrics::items_completed().add(retired as u64, &[]);
        self.journal.record(EventKind::ChunkCompleted {
            worker: id,
            retired,
        });
        self.push_work();
        Ok(())
    }

    /// Run one admission tick and return the chunks it shipped.
    pub fn tick(&mut self) -> Vec<Dispatch> {
        let dispatches = self.admission.tick(&mut self.registry, &self.transport);
        for d in &dispatches {
            self.journal.record(EventKind::ChunkDispatched {
                worker: d.worker,
                size: d.size,
            });
        }
        dispatches
    }

    fn push_work(&mut self) -> usize {
        self.tick().iter().map(|d| d.size).sum()
    }

    fn abort_pass(&mut self, e: &crate::error::Error) {
        error!(error = %e, "distribution pass aborted");
        metrics::passes_aborted().add(1, &[]);
        self.journal.record(EventKind::PassAborted {
            reason: e.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &WorkQueueRegistry {
        &self.registry
    }

    pub fn buffer(&self) -> &PendingBuffer {
        &self.buffer
    }

    pub fn members(&self) -> &MembershipTracker {
        &self.members
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn admission_cap(&self) -> usize {
        self.admission.cap()
    }

    /// Retained journal entries with a sequence number greater than `seq`.
    pub fn events_since(&self, seq: u64) -> Vec<&Event> {
        self.journal.since(seq)
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn input_exhausted(&self) -> bool {
        self.input_exhausted
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            workers: self.registry.worker_count(),
            pending: self.registry.total_pending(),
            working: self.registry.total_working(),
            buffered: self.buffer.len(),
        }
    }

    /// True once input is exhausted and nothing is pending, buffered, or
    /// in flight.
    pub fn is_drained(&self) -> bool {
        let s = self.snapshot();
        self.input_exhausted && s.pending == 0 && s.working == 0 && s.buffered == 0
    }
}

fn log_assignments(assignments: &[Assignment]) {
    for (worker, count) in balance::totals(assignments) {
        debug!(worker = %worker, count, "assigned records");
    }
}
