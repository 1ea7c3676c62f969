//! Work queue registry and pending buffer.
//!
//! The registry is the single source of truth for which worker owns which
//! work item. Queues are FIFO; working items always sit at the front of a
//! queue because new items are only ever appended and dispatch always takes
//! the oldest pending items first.

use std::collections::{BTreeMap, VecDeque};

use crate::model::{Record, WorkItem, WorkerId};

/// Mapping from worker identity to that worker's ordered queue.
///
/// Backed by a `BTreeMap` so iteration is always in ascending worker id
/// order, which keeps every pass over the registry deterministic.
#[derive(Debug, Default)]
pub struct WorkQueueRegistry {
    queues: BTreeMap<WorkerId, VecDeque<WorkItem>>,
}

impl WorkQueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue for `id` if it has none. Returns true if an
    /// entry was created.
    pub fn ensure_worker(&mut self, id: WorkerId) -> bool {
        if self.queues.contains_key(&id) {
            return false;
        }
        self.queues.insert(id, VecDeque::new());
        true
    }

    /// Delete the entry for `id`, returning whatever its queue still held.
    pub fn remove_worker(&mut self, id: WorkerId) -> Option<VecDeque<WorkItem>> {
        self.queues.remove(&id)
    }

    /// The live queue for `id`, or `None` if the worker has no entry.
    pub fn queue_for(&mut self, id: WorkerId) -> Option<&mut VecDeque<WorkItem>> {
        self.queues.get_mut(&id)
    }

    pub fn queue(&self, id: WorkerId) -> Option<&VecDeque<WorkItem>> {
        self.queues.get(&id)
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.queues.contains_key(&id)
    }

    /// Worker ids in ascending order.
    pub fn worker_ids(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.queues.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, &VecDeque<WorkItem>)> {
        self.queues.iter().map(|(id, q)| (*id, q))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (WorkerId, &mut VecDeque<WorkItem>)> {
        self.queues.iter_mut().map(|(id, q)| (*id, q))
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of working items owned by `id` (0 if unknown).
    pub fn working_count(&self, id: WorkerId) -> usize {
        self.queues
            .get(&id)
            .map_or(0, |q| q.iter().filter(|wi| wi.working).count())
    }

    /// Number of pending items owned by `id` (0 if unknown).
    pub fn pending_count(&self, id: WorkerId) -> usize {
        self.queues
            .get(&id)
            .map_or(0, |q| q.iter().filter(|wi| wi.is_pending()).count())
    }

    pub fn total_working(&self) -> usize {
        self.queues
            .values()
            .map(|q| q.iter().filter(|wi| wi.working).count())
            .sum()
    }

    pub fn total_pending(&self) -> usize {
        self.queues
            .values()
            .map(|q| q.iter().filter(|wi| wi.is_pending()).count())
            .sum()
    }

    /// Current queue length per worker, in ascending id order.
    pub fn loads(&self) -> Vec<(WorkerId, usize)> {
        self.queues.iter().map(|(id, q)| (*id, q.len())).collect()
    }

    /// Remove every pending item from every queue and return their records,
    /// queue by queue in ascending id order. Working items stay put.
    pub fn take_pending(&mut self) -> Vec<Record> {
        let mut taken = Vec::new();
        for queue in self.queues.values_mut() {
            let mut kept = VecDeque::with_capacity(queue.len());
            for item in queue.drain(..) {
                if item.working {
                    kept.push_back(item);
                } else {
                    taken.push(item.record);
                }
            }
            *queue = kept;
        }
        taken
    }

    /// Remove up to `count` working items from the front of `id`'s queue.
    /// Returns how many were removed; unknown ids remove nothing.
    pub fn retire_working(&mut self, id: WorkerId, count: usize) -> usize {
        let Some(queue) = self.queues.get_mut(&id) else {
            return 0;
        };
        let mut retired = 0;
        while retired < count && queue.front().is_some_and(|wi| wi.working) {
            queue.pop_front();
            retired += 1;
        }
        retired
    }
}

// ---------------------------------------------------------------------------
// Pending buffer
// ---------------------------------------------------------------------------

/// Records waiting for the first worker to show up.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    records: Vec<Record>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    /// Take every buffered record, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
