//! Structured events emitted by the coordinator on every state change.
//!
//! The journal is the coordinator's record of its recent decisions; tests
//! and operators read it back with [`Journal::since`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::WorkerId;

/// A structured event emitted by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, starting at 1. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BatchIngested {
        records: usize,
    },
    RecordsBuffered {
        records: usize,
        buffered_total: usize,
    },
    WorkerRegistered {
        worker: WorkerId,
    },
    JoinIgnored {
        worker: WorkerId,
        state: String,
    },
    WorkerLost {
        worker: WorkerId,
        abandoned: usize,
        requeued: usize,
    },
    Redistributed {
        reclaimed: usize,
        unbuffered: usize,
    },
    ChunkDispatched {
        worker: WorkerId,
        size: usize,
    },
    ChunkCompleted {
        worker: WorkerId,
        retired: usize,
    },
    InputExhausted,
    PassAborted {
        reason: String,
    },
}

/// Default number of events a [`Journal`] retains.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 4096;

/// In-memory event log holding the most recent `capacity` events.
///
/// Sequence numbers keep increasing after old events are evicted, so a
/// reader that falls behind sees a gap between its last `seq` and
/// [`Journal::oldest_seq`].
#[derive(Debug)]
pub struct Journal {
    events: VecDeque<Event>,
    next_seq: u64,
    capacity: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
            next_seq: 1,
            capacity,
        }
    }

    pub fn record(&mut self, kind: EventKind) -> &Event {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
        &self.events[self.events.len() - 1]
    }

    /// Retained events with a sequence number greater than `seq`, oldest
    /// first.
    pub fn since(&self, seq: u64) -> Vec<&Event> {
        let start = self.events.partition_point(|e| e.seq <= seq);
        self.events.range(start..).collect()
    }

    /// Sequence number of the oldest retained event.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.events.front().map(|e| e.seq)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_events_are_evicted_at_capacity() {
        let mut journal = Journal::with_capacity(3);
        for _ in 0..5 {
            journal.record(EventKind::InputExhausted);
        }

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.oldest_seq(), Some(3));
        let seqs: Vec<u64> = journal.since(0).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [3, 4, 5]);
        let seqs: Vec<u64> = journal.since(4).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [5]);
        assert!(journal.since(5).is_empty());
    }

    #[test]
    fn zero_capacity_keeps_the_latest_event() {
        let mut journal = Journal::with_capacity(0);
        journal.record(EventKind::InputExhausted);
        journal.record(EventKind::InputExhausted);
        assert_eq!(journal.capacity(), 1);
        assert_eq!(journal.oldest_seq(), Some(2));
    }
}
