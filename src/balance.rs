//! Load balancing: decide which worker queue each new record goes to.
//!
//! Balancing is split into a pure planning step over queue lengths and an
//! apply step that moves records into the registry. A plan that fails its
//! postcondition is rejected before the registry is touched, so an aborted
//! pass never drops or duplicates records.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Record, WorkItem, WorkerId};
use crate::registry::WorkQueueRegistry;

/// Which phase of the algorithm produced an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Filling shorter queues up to the longest one.
    Equalize,
    /// Splitting what is left evenly once every queue is level.
    EvenSplit,
}

/// `count` consecutive records go to `worker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub worker: WorkerId,
    pub count: usize,
    pub phase: Phase,
}

/// Plan how `records` new records are spread over workers whose current
/// queue lengths are `loads`.
///
/// Workers are visited by ascending queue length, ties broken by ascending
/// id. The equalize phase tops every queue up to the longest one; any
/// remainder is then split evenly, with the `remainder % workers` leftover
/// handed out one apiece in visiting order and the last worker absorbing
/// whatever is still unassigned.
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] if there are records but no
/// workers, or if the plan does not account for every record.
pub fn plan(loads: &[(WorkerId, usize)], records: usize) -> Result<Vec<Assignment>> {
    if records == 0 {
        return Ok(Vec::new());
    }
    if loads.is_empty() {
        return Err(Error::InvariantViolation(format!(
            "{records} records to distribute but no workers"
        )));
    }

    let mut order = loads.to_vec();
    order.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let max = order.last().map_or(0, |(_, len)| *len);
    let mut remaining = records;
    let mut assignments = Vec::new();

    // Fill up buckets.
    for (worker, len) in &order {
        let take = (max - len).min(remaining);
        if take > 0 {
            assignments.push(Assignment {
                worker: *worker,
                count: take,
                phase: Phase::Equalize,
            });
            remaining -= take;
        }
        if remaining == 0 {
            break;
        }
    }

    // Split the rest evenly.
    if remaining > 0 {
        let workers = order.len();
        let per_worker = remaining / workers;
        let extra = remaining % workers;
        for (idx, (worker, _)) in order.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let take = if idx + 1 == workers {
                remaining
            } else {
                (per_worker + usize::from(idx < extra)).min(remaining)
            };
            if take > 0 {
                assignments.push(Assignment {
                    worker: *worker,
                    count: take,
                    phase: Phase::EvenSplit,
                });
                remaining -= take;
            }
        }
    }

    let planned: usize = assignments.iter().map(|a| a.count).sum();
    if planned != records {
        return Err(Error::InvariantViolation(format!(
            "balancer planned {planned} of {records} records"
        )));
    }
    Ok(assignments)
}

/// Append `records` to registry queues according to `assignments`.
///
/// Every assigned worker must already have a registry entry; this is
/// checked before any queue is modified.
pub fn apply(
    registry: &mut WorkQueueRegistry,
    records: Vec<Record>,
    assignments: &[Assignment],
) -> Result<()> {
    let planned: usize = assignments.iter().map(|a| a.count).sum();
    if planned != records.len() {
        return Err(Error::InvariantViolation(format!(
            "plan covers {planned} records but {} were supplied",
            records.len()
        )));
    }
    if let Some(missing) = assignments.iter().find(|a| !registry.contains(a.worker)) {
        return Err(Error::InvariantViolation(format!(
            "plan assigns work to unregistered worker {}",
            missing.worker
        )));
    }

    let mut records = records.into_iter();
    for assignment in assignments {
        debug!(
            worker = %assignment.worker,
            count = assignment.count,
            phase = ?assignment.phase,
            "giving worker new records"
        );
        if let Some(queue) = registry.queue_for(assignment.worker) {
            queue.extend(records.by_ref().take(assignment.count).map(WorkItem::new));
        }
    }
    Ok(())
}

/// Total records per worker in a plan, in first-seen order.
pub fn totals(assignments: &[Assignment]) -> Vec<(WorkerId, usize)> {
    let mut totals: Vec<(WorkerId, usize)> = Vec::new();
    for a in assignments {
        match totals.iter_mut().find(|(w, _)| *w == a.worker) {
            Some((_, n)) => *n += a.count,
            None => totals.push((a.worker, a.count)),
        }
    }
    totals
}
