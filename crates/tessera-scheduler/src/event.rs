//! Wait queues for procedures suspended on a lock.

use std::collections::VecDeque;

use tessera_types::ProcId;

use crate::procedure::ProcedureRef;

/// FIFO of procedures suspended waiting for one entity's lock.
///
/// Distinct from the entity's runnable FIFO: wake order (strict FIFO here)
/// is independent of dispatch order. A suspended procedure is owned by
/// exactly one wait queue at a time; waking transfers it back into its
/// entity queue as a front-push.
#[derive(Debug, Default)]
pub(crate) struct EventWaitQueue {
    waiters: VecDeque<ProcedureRef>,
}

impl EventWaitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn suspend(&mut self, proc: ProcedureRef) {
        self.waiters.push_back(proc);
    }

    /// Pop the single oldest waiter (exclusive-lock events release at most
    /// one successor per transition).
    pub(crate) fn pop_front(&mut self) -> Option<ProcedureRef> {
        self.waiters.pop_front()
    }

    /// Take every waiter, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<ProcedureRef> {
        self.waiters.drain(..).collect()
    }

    /// Remove a suspended procedure by id (cancellation path). O(len).
    pub(crate) fn remove(&mut self, proc_id: ProcId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|p| p.proc_id() != proc_id);
        self.waiters.len() != before
    }

    pub(crate) fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}
