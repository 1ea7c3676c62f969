//! Admission control: ship pending work without exceeding the per-worker cap.

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::debug;

use crate::model::{Outbound, WorkerId};
use crate::registry::WorkQueueRegistry;
use crate::telemetry::metrics;
use crate::transport::Transport;

/// Default maximum number of working items per worker.
pub const DEFAULT_ADMISSION_CAP: usize = 5;

/// One chunk shipped during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    pub worker: WorkerId,
    pub size: usize,
}

/// Promotes pending items to working, at most `cap` working per worker.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionController {
    cap: usize,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_CAP)
    }
}

impl AdmissionController {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Run one dispatch tick over every worker in the registry.
    ///
    /// For each worker, the oldest pending items that fit under the cap are
    /// marked working and sent as a single chunk. Workers that are saturated
    /// or have nothing pending get nothing. Calling this again with no state
    /// change in between sends nothing.
    pub fn tick<X: Transport + ?Sized>(
        &self,
        registry: &mut WorkQueueRegistry,
        transport: &X,
    ) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        for (worker, queue) in registry.iter_mut() {
            let working = queue.iter().filter(|wi| wi.working).count();
            let available = self.cap.saturating_sub(working);
            if available == 0 {
                continue;
            }

            let records: Vec<_> = queue
                .iter_mut()
                .filter(|wi| wi.is_pending())
                .take(available)
                .map(|wi| {
                    wi.working = true;
                    wi.record.clone()
                })
                .collect();
            if records.is_empty() {
                continue;
            }

            let size = records.len();
            debug!(worker = %worker, size, working = working + size, "sending chunk");
            transport.send(worker, Outbound::Chunk { records });

            metrics::chunks_dispatched().add(1, &[]);
            metrics::items_dispatched().add(
                size as u64,
                &[KeyValue::new("worker", worker.to_string())],
            );
            dispatches.push(Dispatch { worker, size });
        }

        dispatches
    }
}
