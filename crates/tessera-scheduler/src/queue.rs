//! Entity queues: one lockable entity plus its FIFO of runnable procedures.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_types::{ProcId, ServerName, ServerOperation, TableName, TableOperation};

use crate::arena::{Arena, Idx};
use crate::event::EventWaitQueue;
use crate::fair::{FairNode, RunLink};
use crate::lock::LockState;
use crate::procedure::{LockHolder, ProcedureRef};

/// FIFO of runnable procedures bound to one entity.
///
/// Back-push is the default; front-push is reserved for yielded procedures
/// and for children inheriting a parent's exclusive lock (a child must run
/// before other queued work).
#[derive(Debug, Default)]
pub(crate) struct ProcFifo {
    procs: std::collections::VecDeque<ProcedureRef>,
}

impl ProcFifo {
    pub(crate) fn add(&mut self, proc: ProcedureRef, add_front: bool) {
        if add_front {
            self.procs.push_front(proc);
        } else {
            self.procs.push_back(proc);
        }
    }

    pub(crate) fn peek(&self) -> Option<&ProcedureRef> {
        self.procs.front()
    }

    pub(crate) fn poll(&mut self) -> Option<ProcedureRef> {
        self.procs.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.procs.len()
    }
}

/// Common dispatch surface of table and server queues.
pub(crate) trait DispatchQueue: FairNode {
    fn fifo(&self) -> &ProcFifo;
    fn fifo_mut(&mut self) -> &mut ProcFifo;
    fn lock(&self) -> &LockState;
}

// ---------------------------------------------------------------------------
// NamespaceQueue
// ---------------------------------------------------------------------------

/// Degenerate entity queue for a namespace: lock state and wait queue only.
///
/// Namespace operations are rare, so namespaces never participate in
/// dispatch — tables take a namespace-level shared lock instead, and this
/// node exists to hold it.
pub(crate) struct NamespaceQueue {
    pub(crate) name: String,
    pub(crate) lock: LockState,
    pub(crate) event: EventWaitQueue,
}

impl NamespaceQueue {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            lock: LockState::new(),
            event: EventWaitQueue::new(),
        }
    }
}

impl fmt::Debug for NamespaceQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceQueue")
            .field("name", &self.name)
            .field("xlock", &self.lock.exclusive_owner())
            .field("shared", &self.lock.shared_count())
            .field("waiters", &self.event.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ServerQueue
// ---------------------------------------------------------------------------

/// Queue of procedures targeting one region server.
pub(crate) struct ServerQueue {
    pub(crate) key: ServerName,
    pub(crate) fifo: ProcFifo,
    pub(crate) lock: LockState,
    pub(crate) event: EventWaitQueue,
    pub(crate) link: RunLink<ServerQueue>,
}

impl ServerQueue {
    pub(crate) fn new(key: ServerName) -> Self {
        Self {
            key,
            fifo: ProcFifo::default(),
            lock: LockState::new(),
            event: EventWaitQueue::new(),
            link: RunLink::new(),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        !self.lock.has_exclusive() && !self.fifo.is_empty()
    }
}

impl FairNode for ServerQueue {
    fn run_link(&self) -> &RunLink<Self> {
        &self.link
    }
    fn run_link_mut(&mut self) -> &mut RunLink<Self> {
        &mut self.link
    }
    fn priority(&self) -> u32 {
        1
    }
}

impl DispatchQueue for ServerQueue {
    fn fifo(&self) -> &ProcFifo {
        &self.fifo
    }
    fn fifo_mut(&mut self) -> &mut ProcFifo {
        &mut self.fifo
    }
    fn lock(&self) -> &LockState {
        &self.lock
    }
}

impl fmt::Debug for ServerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerQueue")
            .field("key", &self.key.to_string())
            .field("xlock", &self.lock.exclusive_owner())
            .field("shared", &self.lock.shared_count())
            .field("size", &self.fifo.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TableQueue
// ---------------------------------------------------------------------------

/// Queue of procedures targeting one table.
///
/// Also hosts the table's region events behind its own monitor: region
/// fan-out (sorting, per-region lock attempts) runs after the scheduler
/// mutex is released, keeping it off the global critical section. Lock
/// order is scheduler mutex strictly before region monitor, never nested.
pub(crate) struct TableQueue {
    pub(crate) key: TableName,
    pub(crate) priority: u32,
    pub(crate) namespace: Idx<NamespaceQueue>,
    pub(crate) fifo: ProcFifo,
    pub(crate) lock: LockState,
    pub(crate) event: EventWaitQueue,
    pub(crate) link: RunLink<TableQueue>,
    pub(crate) regions: Arc<Mutex<RegionMap>>,
}

impl TableQueue {
    pub(crate) fn new(key: TableName, namespace: Idx<NamespaceQueue>, priority: u32) -> Self {
        Self {
            key,
            priority,
            namespace,
            fifo: ProcFifo::default(),
            lock: LockState::new(),
            event: EventWaitQueue::new(),
            link: RunLink::new(),
            regions: Arc::new(Mutex::new(RegionMap::default())),
        }
    }

    /// Whether the head of this queue may be dispatched.
    ///
    /// Requires a non-empty FIFO and an unlocked namespace. Under a table
    /// exclusive lock only procedures with lock access (the owner's
    /// children) qualify.
    pub(crate) fn is_available(&self, namespaces: &Arena<NamespaceQueue>) -> bool {
        if self.fifo.is_empty() || namespaces[self.namespace].lock.has_exclusive() {
            return false;
        }
        if self.lock.has_exclusive() {
            return match self.fifo.peek() {
                Some(next) => self.lock.has_lock_access(&LockHolder::of(&**next)),
                None => false,
            };
        }
        true
    }
}

impl FairNode for TableQueue {
    fn run_link(&self) -> &RunLink<Self> {
        &self.link
    }
    fn run_link_mut(&mut self) -> &mut RunLink<Self> {
        &mut self.link
    }
    fn priority(&self) -> u32 {
        self.priority
    }
}

impl DispatchQueue for TableQueue {
    fn fifo(&self) -> &ProcFifo {
        &self.fifo
    }
    fn fifo_mut(&mut self) -> &mut ProcFifo {
        &mut self.fifo
    }
    fn lock(&self) -> &LockState {
        &self.lock
    }
}

impl fmt::Debug for TableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableQueue")
            .field("key", &self.key.to_string())
            .field("priority", &self.priority)
            .field("xlock", &self.lock.exclusive_owner())
            .field("shared", &self.lock.shared_count())
            .field("size", &self.fifo.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Region events
// ---------------------------------------------------------------------------

/// Lock state and wait queue of one region, keyed by encoded region name
/// inside its table's region map.
///
/// Regions only lock exclusively. Created on first wait; removed when the
/// lock is released with no waiters left.
#[derive(Debug, Default)]
pub(crate) struct RegionEvent {
    pub(crate) lock: LockState,
    pub(crate) waiters: EventWaitQueue,
}

/// Per-table map of region events, guarded by the table queue's monitor.
#[derive(Debug, Default)]
pub(crate) struct RegionMap {
    events: HashMap<String, RegionEvent>,
}

impl RegionMap {
    pub(crate) fn get_or_create(&mut self, encoded_name: &str) -> &mut RegionEvent {
        self.events
            .entry(encoded_name.to_owned())
            .or_insert_with(RegionEvent::default)
    }

    pub(crate) fn get_mut(&mut self, encoded_name: &str) -> Option<&mut RegionEvent> {
        self.events.get_mut(encoded_name)
    }

    pub(crate) fn remove(&mut self, encoded_name: &str) {
        self.events.remove(encoded_name);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Cancellation sweep: drop `proc_id` from whichever region event holds
    /// it. O(regions × waiters).
    pub(crate) fn remove_waiter(&mut self, proc_id: ProcId) -> bool {
        for event in self.events.values_mut() {
            if event.waiters.remove(proc_id) {
                return true;
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Exclusive-lock classification
// ---------------------------------------------------------------------------

/// Whether a table operation needs the table's exclusive lock.
///
/// Region operations run under the table's shared lock plus a per-region
/// exclusive lock instead. Concurrent `Edit`s are allowed on the namespace
/// registry table, since namespace procedures edit disjoint rows.
pub(crate) fn requires_table_exclusive_lock(op: TableOperation, table: &TableName) -> bool {
    match op {
        TableOperation::Create
        | TableOperation::Delete
        | TableOperation::Disable
        | TableOperation::Enable => true,
        TableOperation::Edit => !table.is_namespace_registry(),
        TableOperation::Read => false,
        TableOperation::Split
        | TableOperation::Merge
        | TableOperation::Assign
        | TableOperation::Unassign
        | TableOperation::RegionEdit => false,
    }
}

/// Whether a server operation needs the server's exclusive lock.
pub(crate) fn requires_server_exclusive_lock(op: ServerOperation) -> bool {
    match op {
        ServerOperation::CrashHandler => true,
    }
}
