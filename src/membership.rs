//! Worker membership and the reclaim-and-redistribute pass.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::balance::{self, Assignment};
use crate::error::Result;
use crate::model::WorkerId;
use crate::registry::{PendingBuffer, WorkQueueRegistry};

/// Lifecycle of a worker identity. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Unregistered,
    Registered,
    Terminated,
}

impl MemberState {
    pub fn can_transition_to(self, to: MemberState) -> bool {
        use MemberState::*;
        matches!(
            (self, to),
            (Unregistered, Registered) | (Registered, Terminated)
        )
    }
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberState::Unregistered => "unregistered",
            MemberState::Registered => "registered",
            MemberState::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Tracks which workers are live.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    members: BTreeMap<WorkerId, MemberState>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: WorkerId) -> MemberState {
        self.members
            .get(&id)
            .copied()
            .unwrap_or(MemberState::Unregistered)
    }

    /// Move `id` to `Registered`. Returns the state it was in; only
    /// `Unregistered` results in a transition.
    pub fn join(&mut self, id: WorkerId) -> MemberState {
        let previous = self.state(id);
        if previous.can_transition_to(MemberState::Registered) {
            self.members.insert(id, MemberState::Registered);
        }
        previous
    }

    /// Move `id` to `Terminated`. Returns true if it was registered.
    pub fn leave(&mut self, id: WorkerId) -> bool {
        let previous = self.state(id);
        if previous.can_transition_to(MemberState::Terminated) {
            self.members.insert(id, MemberState::Terminated);
            true
        } else {
            false
        }
    }

    pub fn is_live(&self, id: WorkerId) -> bool {
        self.state(id) == MemberState::Registered
    }

    /// Live workers in ascending id order.
    pub fn live(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.members
            .iter()
            .filter(|(_, s)| **s == MemberState::Registered)
            .map(|(id, _)| *id)
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }
}

/// Outcome of a reclaim-and-redistribute pass.
#[derive(Debug, Clone, Default)]
pub struct Redistribution {
    /// Pending items pulled back out of worker queues.
    pub reclaimed: usize,
    /// Records that came out of the pending buffer.
    pub unbuffered: usize,
    pub assignments: Vec<Assignment>,
}

/// Pull every not-yet-started item back out of the registry, add the
/// buffered records, and balance the lot across all live workers.
///
/// Working items are never moved. The plan is computed against the queue
/// lengths that will remain once pending items are removed, so if planning
/// fails nothing has been extracted and the registry and buffer are
/// unchanged.
pub fn reclaim_and_redistribute(
    registry: &mut WorkQueueRegistry,
    buffer: &mut PendingBuffer,
    live: impl IntoIterator<Item = WorkerId>,
) -> Result<Redistribution> {
    for id in live {
        registry.ensure_worker(id);
    }

    let reclaimable = registry.total_pending();
    let incoming = reclaimable + buffer.len();
    let loads: Vec<_> = registry
        .worker_ids()
        .map(|id| (id, registry.working_count(id)))
        .collect();
    let assignments = balance::plan(&loads, incoming)?;

    let mut records = registry.take_pending();
    let reclaimed = records.len();
    let buffered = buffer.drain();
    let unbuffered = buffered.len();
    records.extend(buffered);

    debug!(reclaimed, unbuffered, "redistributing unstarted work");
    balance::apply(registry, records, &assignments)?;
    info!(
        workers = registry.worker_count(),
        reclaimed, unbuffered, "work redistributed"
    );

    Ok(Redistribution {
        reclaimed,
        unbuffered,
        assignments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_workers_cannot_rejoin() {
        let mut members = MembershipTracker::new();
        let id = WorkerId::new();
        assert_eq!(members.join(id), MemberState::Unregistered);
        assert_eq!(members.join(id), MemberState::Registered);
        assert!(members.leave(id));
        assert!(!members.leave(id));
        assert_eq!(members.join(id), MemberState::Terminated);
        assert!(!members.is_live(id));
        assert_eq!(members.live_count(), 0);
    }
}
