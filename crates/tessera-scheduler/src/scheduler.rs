//! The master procedure scheduler façade.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, info, trace};

use tessera_types::{RegionInfo, ServerName, TableName, TableOperation};

use crate::arena::{Arena, Idx};
use crate::config::SchedulerConfig;
use crate::fair::FairQueue;
use crate::procedure::{have_same_parent, LockHolder, Procedure, ProcedureRef, ProcedureScope};
use crate::queue::{
    requires_server_exclusive_lock, requires_table_exclusive_lock, DispatchQueue, NamespaceQueue,
    ServerQueue, TableQueue,
};

/// Server queues are sharded across this many ordered buckets.
const SERVER_BUCKETS: usize = 128;

/// Decides which procedure the executor runs next, and arbitrates the
/// namespace → table → region lock hierarchy plus per-server locks.
///
/// Most master operations can run concurrently when they touch different
/// tables or different servers; this scheduler hands the executor only
/// procedures that can make progress, suspending the rest on the wait
/// queue of the lock they need.
///
/// One mutex guards all scheduling state; executor workers call
/// [`poll`](Self::poll) concurrently and sleep on the co-located condvar
/// while nothing is runnable. Region fan-out is the one exception: each
/// table's region events sit behind that table's own monitor, taken only
/// after the scheduler mutex is released.
pub struct MasterProcedureScheduler {
    sched: Mutex<Sched>,
    poll_cond: Condvar,
}

impl Default for MasterProcedureScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl MasterProcedureScheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "procedure scheduler created");
        Self {
            sched: Mutex::new(Sched {
                running: true,
                config,
                tables: Arena::new(),
                servers: Arena::new(),
                namespaces: Arena::new(),
                table_index: BTreeMap::new(),
                namespace_index: BTreeMap::new(),
                server_buckets: Box::new(std::array::from_fn(|_| BTreeMap::new())),
                table_run_queue: FairQueue::new(),
                server_run_queue: FairQueue::new(),
            }),
            poll_cond: Condvar::new(),
        }
    }

    /// Resume handing out procedures after a [`stop`](Self::stop).
    pub fn start(&self) {
        self.sched.lock().running = true;
    }

    /// Stop handing out procedures and wake every sleeping poller so
    /// executor workers can drain.
    pub fn stop(&self) {
        self.sched.lock().running = false;
        info!("procedure scheduler stopped");
        self.poll_cond.notify_all();
    }

    // -----------------------------------------------------------------------
    // Enqueue / dequeue
    // -----------------------------------------------------------------------

    /// Add a runnable procedure to its entity's queue.
    ///
    /// `add_front` puts it ahead of already-queued work; required for
    /// yielded procedures and for children of a procedure holding the
    /// entity's exclusive lock.
    ///
    /// # Panics
    ///
    /// Panics if the procedure has neither a table nor a server scope, or
    /// if a child of the lock owner is enqueued at the back.
    pub fn enqueue(&self, proc: ProcedureRef, add_front: bool) {
        trace!(proc = %proc.proc_id(), add_front, "enqueue");
        self.sched.lock().enqueue(proc, add_front);
        self.poll_cond.notify_one();
    }

    /// Put a procedure that gave up its timeslice back at the front of its
    /// queue.
    pub fn yield_procedure(&self, proc: ProcedureRef) {
        self.enqueue(proc, true);
    }

    /// Take the next dispatchable procedure, if any.
    ///
    /// Crashed-server recovery preempts table work: the server run queue is
    /// polled first.
    pub fn dequeue(&self) -> Option<ProcedureRef> {
        self.sched.lock().dequeue()
    }

    /// Take the next dispatchable procedure, sleeping until one exists or
    /// the scheduler is stopped.
    pub fn poll(&self) -> Option<ProcedureRef> {
        let mut sched = self.sched.lock();
        loop {
            if !sched.running {
                return None;
            }
            if let Some(proc) = sched.dequeue() {
                return Some(proc);
            }
            self.poll_cond.wait(&mut sched);
        }
    }

    /// [`poll`](Self::poll) with a deadline; `None` on timeout.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<ProcedureRef> {
        let deadline = Instant::now() + timeout;
        let mut sched = self.sched.lock();
        loop {
            if !sched.running {
                return None;
            }
            if let Some(proc) = sched.dequeue() {
                return Some(proc);
            }
            if self.poll_cond.wait_until(&mut sched, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Total count of runnable procedures across every entity queue.
    #[must_use]
    pub fn size(&self) -> usize {
        let sched = self.sched.lock();
        sched.tables.iter().map(|(_, q)| q.fifo.len()).sum::<usize>()
            + sched.servers.iter().map(|(_, q)| q.fifo.len()).sum::<usize>()
    }

    /// Whether any entity queue currently has a dispatchable head.
    #[must_use]
    pub fn has_runnables(&self) -> bool {
        let sched = self.sched.lock();
        sched.server_run_queue.has_runnables() || sched.table_run_queue.has_runnables()
    }

    /// Drop every queue (shutdown). The scheduler must not be in use.
    pub fn clear(&self) {
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        for bucket in 0..SERVER_BUCKETS {
            while let Some((_, id)) = sched.server_buckets[bucket].pop_first() {
                remove_from_run_queue(&mut sched.server_run_queue, &mut sched.servers, id);
                sched.servers.remove(id);
            }
        }
        while let Some((_, id)) = sched.namespace_index.pop_first() {
            sched.namespaces.remove(id);
        }
        while let Some((_, id)) = sched.table_index.pop_first() {
            remove_from_run_queue(&mut sched.table_run_queue, &mut sched.tables, id);
            sched.tables.remove(id);
        }
        debug_assert_eq!(sched.tables.len(), 0);
        debug_assert_eq!(sched.servers.len(), 0);
        debug_assert_eq!(sched.namespaces.len(), 0);
        info!("procedure scheduler cleared");
    }

    // -----------------------------------------------------------------------
    // Completion cleanup
    // -----------------------------------------------------------------------

    /// Called by the executor once a procedure finishes (successfully or
    /// not), to tear down the table queue of a table that no longer exists.
    ///
    /// The terminal error only *suggests* whether the table is gone;
    /// [`mark_table_as_deleted`](Self::mark_table_as_deleted) is the
    /// authoritative check.
    pub fn completion_cleanup(&self, proc: &ProcedureRef) {
        let Some(ProcedureScope::Table { table, op }) = proc.scope() else {
            // nothing to clean up for server procedures
            return;
        };
        let table_deleted = match proc.terminal_error() {
            Some(err) => {
                if op == TableOperation::Create {
                    // create failed because the table already exists
                    !err.is_table_exists()
                } else {
                    // the operation failed because the table does not exist
                    err.is_table_not_found()
                }
            }
            None => op == TableOperation::Delete,
        };
        if table_deleted {
            self.mark_table_as_deleted(table, proc);
        }
    }

    /// Remove the queue and lock of a table proven quiescent: empty FIFO
    /// and a fresh exclusive lock both succeed.
    ///
    /// Returns `false` when new operations are already pending for the
    /// table (e.g. a create re-using the name); the queue then stays.
    pub fn mark_table_as_deleted(&self, table: &TableName, proc: &ProcedureRef) -> bool {
        let holder = LockHolder::of(&**proc);
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let Some(&id) = sched.table_index.get(table) else {
            return true;
        };
        if sched.tables[id].fifo.is_empty() && sched.tables[id].lock.try_exclusive(&holder) {
            remove_from_run_queue(&mut sched.table_run_queue, &mut sched.tables, id);
            sched.table_index.remove(table);
            sched.tables.remove(id);
            debug!(table = %table, "table queue removed");
            true
        } else {
            false
        }
    }

    // -----------------------------------------------------------------------
    // Table locks
    // -----------------------------------------------------------------------

    /// Try to take the table's exclusive lock for `proc`, suspending it on
    /// failure. Returns `true` iff the procedure has to wait.
    ///
    /// Takes the namespace's shared lock first; holding the exclusive lock
    /// parks the table queue out of the run queue until release.
    pub fn wait_table_exclusive_lock(&self, proc: &ProcedureRef, table: &TableName) -> bool {
        let holder = LockHolder::of(&**proc);
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let id = sched.table_queue(table);
        let ns = sched.tables[id].namespace;
        if !sched.namespaces[ns].lock.try_shared() {
            trace!(proc = %holder.id(), table = %table, "suspended on namespace lock");
            sched.namespaces[ns].event.suspend(proc.clone());
            return true;
        }
        if !sched.tables[id].lock.try_exclusive(&holder) {
            trace!(proc = %holder.id(), table = %table, "suspended on table xlock");
            sched.namespaces[ns].lock.release_shared();
            sched.tables[id].event.suspend(proc.clone());
            return true;
        }
        remove_from_run_queue(&mut sched.table_run_queue, &mut sched.tables, id);
        false
    }

    /// Release the table's exclusive lock and wake its waiters.
    ///
    /// A child running under its parent's lock releases nothing; the
    /// parent's lock stays until the parent itself wakes the table.
    pub fn wake_table_exclusive_lock(&self, proc: &ProcedureRef, table: &TableName) {
        let holder = LockHolder::of(&**proc);
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let id = sched.table_queue(table);
        let mut woken: Vec<ProcedureRef> = Vec::new();
        if !sched.tables[id].lock.has_parent_lock(&holder) {
            sched.tables[id].lock.release_exclusive(&holder);
            woken.extend(sched.tables[id].event.drain());
        }
        let ns = sched.tables[id].namespace;
        if sched.namespaces[ns].lock.release_shared() {
            woken.extend(sched.namespaces[ns].event.drain());
        }
        let count = woken.len();
        for p in woken {
            sched.wake_procedure(p);
        }
        add_to_run_queue(&mut sched.table_run_queue, &mut sched.tables, id);
        drop(guard);
        self.wake_poll_if_needed(count);
    }

    /// Try to take the table's shared lock for `proc`, suspending it on
    /// failure. Returns `true` iff the procedure has to wait.
    pub fn wait_table_shared_lock(&self, proc: &ProcedureRef, table: &TableName) -> bool {
        self.sched
            .lock()
            .wait_table_queue_shared_lock(proc, table)
            .is_none()
    }

    /// Drop one shared hold on the table, waking waiters when the last
    /// hold goes away.
    pub fn wake_table_shared_lock(&self, _proc: &ProcedureRef, table: &TableName) {
        let mut sched = self.sched.lock();
        let count = sched.wake_table_shared(table);
        drop(sched);
        self.wake_poll_if_needed(count);
    }

    // -----------------------------------------------------------------------
    // Region locks
    // -----------------------------------------------------------------------

    /// [`wait_regions`](Self::wait_regions) for a single region.
    pub fn wait_region(&self, proc: &ProcedureRef, region: &RegionInfo) -> bool {
        let table = region.table().clone();
        let mut regions = [region.clone()];
        self.wait_regions(proc, &table, &mut regions)
    }

    /// Take exclusive locks on a batch of regions of `table`, suspending
    /// the procedure on the first region that is already locked. Returns
    /// `true` iff the procedure has to wait.
    ///
    /// Regions are sorted first so overlapping batches always lock in one
    /// global order; on failure the locks taken by this call are unwound.
    /// A procedure without a parent holds the table's shared lock for the
    /// duration; a child assumes its parent already holds the table lock.
    ///
    /// # Panics
    ///
    /// Panics if a region does not belong to `table` or the batch contains
    /// duplicates.
    pub fn wait_regions(
        &self,
        proc: &ProcedureRef,
        table: &TableName,
        regions: &mut [RegionInfo],
    ) -> bool {
        regions.sort();

        let holder = LockHolder::of(&**proc);
        let region_map = {
            let mut sched = self.sched.lock();
            let id = if holder.has_parent() {
                // the parent procedure already holds the table xlock
                sched.table_queue(table)
            } else {
                match sched.wait_table_queue_shared_lock(proc, table) {
                    Some(id) => id,
                    None => return true,
                }
            };
            sched.tables[id].regions.clone()
        };

        // region fan-out happens under the table's own monitor, off the
        // scheduler mutex
        let mut has_lock = true;
        {
            let mut map = region_map.lock();
            for i in 0..regions.len() {
                let region = &regions[i];
                assert_eq!(
                    region.table(),
                    table,
                    "region {region} does not belong to table {table}"
                );
                assert!(
                    i == 0 || regions[i - 1] != *region,
                    "duplicate region {region}"
                );
                let event = map.get_or_create(region.encoded_name());
                if !event.lock.try_exclusive(&holder) {
                    trace!(proc = %holder.id(), region = %region, "suspended on region xlock");
                    event.waiters.suspend(proc.clone());
                    has_lock = false;
                    for j in (0..i).rev() {
                        map.get_mut(regions[j].encoded_name())
                            .expect("region event acquired in this call")
                            .lock
                            .release_exclusive(&holder);
                    }
                    break;
                }
            }
        }

        if !has_lock && !holder.has_parent() {
            self.wake_table_shared_lock(proc, table);
        }
        !has_lock
    }

    /// [`wake_regions`](Self::wake_regions) for a single region.
    pub fn wake_region(&self, proc: &ProcedureRef, region: &RegionInfo) {
        let table = region.table().clone();
        let mut regions = [region.clone()];
        self.wake_regions(proc, &table, &mut regions);
    }

    /// Release exclusive locks on a batch of regions, handing each lock to
    /// at most one waiter and dropping region events nobody waits on.
    ///
    /// # Panics
    ///
    /// Panics if a region does not belong to `table` or the batch contains
    /// duplicates.
    pub fn wake_regions(&self, proc: &ProcedureRef, table: &TableName, regions: &mut [RegionInfo]) {
        regions.sort();

        let holder = LockHolder::of(&**proc);
        let region_map = {
            let mut sched = self.sched.lock();
            let id = sched.table_queue(table);
            sched.tables[id].regions.clone()
        };

        let mut successors: SmallVec<[ProcedureRef; 4]> = SmallVec::new();
        {
            let mut map = region_map.lock();
            for i in 0..regions.len() {
                let region = &regions[i];
                assert_eq!(
                    region.table(),
                    table,
                    "region {region} does not belong to table {table}"
                );
                assert!(
                    i == 0 || regions[i - 1] != *region,
                    "duplicate region {region}"
                );
                let event = map.get_or_create(region.encoded_name());
                if event.lock.release_exclusive(&holder) {
                    if event.waiters.has_waiters() {
                        // regions hold an xlock: release one successor only
                        successors.push(event.waiters.pop_front().expect("waiter present"));
                    } else {
                        map.remove(region.encoded_name());
                    }
                }
            }
            trace!(
                table = %table,
                released = regions.len(),
                remaining = map.len(),
                "region locks released"
            );
        }

        let mut count = successors.len();
        {
            let mut sched = self.sched.lock();
            for p in successors.into_iter().rev() {
                sched.wake_procedure(p);
            }
            if !holder.has_parent() {
                count += sched.wake_table_shared(table);
            }
        }
        self.wake_poll_if_needed(count);
    }

    // -----------------------------------------------------------------------
    // Namespace locks
    // -----------------------------------------------------------------------

    /// Take the namespace's exclusive lock, bridging through the namespace
    /// registry table's shared lock (which blocks concurrent table
    /// creates/deletes in the namespace's rows). Returns `true` iff the
    /// procedure has to wait.
    pub fn wait_namespace_exclusive_lock(&self, proc: &ProcedureRef, namespace: &str) -> bool {
        let holder = LockHolder::of(&**proc);
        let registry = TableName::namespace_registry();
        let mut sched = self.sched.lock();
        let registry_id = sched.table_queue(&registry);
        if !sched.tables[registry_id].lock.try_shared() {
            trace!(proc = %holder.id(), namespace, "suspended on namespace registry table");
            sched.tables[registry_id].event.suspend(proc.clone());
            return true;
        }
        let ns = sched.namespace_queue(namespace);
        if !sched.namespaces[ns].lock.try_exclusive(&holder) {
            trace!(proc = %holder.id(), namespace, "suspended on namespace xlock");
            sched.tables[registry_id].lock.release_shared();
            sched.namespaces[ns].event.suspend(proc.clone());
            return true;
        }
        false
    }

    /// Release the namespace's exclusive lock and the registry table's
    /// shared hold, waking waiters of both.
    pub fn wake_namespace_exclusive_lock(&self, proc: &ProcedureRef, namespace: &str) {
        let holder = LockHolder::of(&**proc);
        let registry = TableName::namespace_registry();
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let registry_id = sched.table_queue(&registry);
        let ns = sched.namespace_queue(namespace);
        let mut woken: Vec<ProcedureRef> = Vec::new();
        sched.namespaces[ns].lock.release_exclusive(&holder);
        if sched.tables[registry_id].lock.release_shared() {
            add_to_run_queue(&mut sched.table_run_queue, &mut sched.tables, registry_id);
            woken.extend(sched.tables[registry_id].event.drain());
        }
        woken.extend(sched.namespaces[ns].event.drain());
        let count = woken.len();
        for p in woken {
            sched.wake_procedure(p);
        }
        drop(guard);
        self.wake_poll_if_needed(count);
    }

    // -----------------------------------------------------------------------
    // Server locks
    // -----------------------------------------------------------------------

    /// Take the server's exclusive lock, parking its queue on success.
    /// Returns `true` iff the procedure has to wait.
    pub fn wait_server_exclusive_lock(&self, proc: &ProcedureRef, server: &ServerName) -> bool {
        let holder = LockHolder::of(&**proc);
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let id = sched.server_queue(server);
        if sched.servers[id].lock.try_exclusive(&holder) {
            remove_from_run_queue(&mut sched.server_run_queue, &mut sched.servers, id);
            return false;
        }
        trace!(proc = %holder.id(), server = %server, "suspended on server xlock");
        sched.servers[id].event.suspend(proc.clone());
        true
    }

    /// Release the server's exclusive lock, re-link its queue, and wake
    /// its waiters.
    pub fn wake_server_exclusive_lock(&self, proc: &ProcedureRef, server: &ServerName) {
        let holder = LockHolder::of(&**proc);
        let mut guard = self.sched.lock();
        let sched = &mut *guard;
        let id = sched.server_queue(server);
        sched.servers[id].lock.release_exclusive(&holder);
        add_to_run_queue(&mut sched.server_run_queue, &mut sched.servers, id);
        let woken = sched.servers[id].event.drain();
        let count = woken.len();
        for p in woken {
            sched.wake_procedure(p);
        }
        drop(guard);
        self.wake_poll_if_needed(count);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Remove a suspended procedure from its entity's wait queue
    /// (cancellation path). Returns `true` if it was found and removed.
    ///
    /// The owning entity comes from the procedure's scope, so the search
    /// touches only that entity's queues: the table's event, its
    /// namespace's event, and the table's region events, or the server's
    /// event for a server procedure. O(waiters of that entity).
    pub fn remove_waiting(&self, proc: &ProcedureRef) -> bool {
        let proc_id = proc.proc_id();
        match proc.scope() {
            Some(ProcedureScope::Table { table, .. }) => {
                let region_map = {
                    let mut guard = self.sched.lock();
                    let sched = &mut *guard;
                    let Some(&id) = sched.table_index.get(table) else {
                        return false;
                    };
                    if sched.tables[id].event.remove(proc_id) {
                        return true;
                    }
                    let ns = sched.tables[id].namespace;
                    if sched.namespaces[ns].event.remove(proc_id) {
                        return true;
                    }
                    // namespace procedures are scoped to the registry table
                    // but suspend on their target namespace's event
                    if table.is_namespace_registry() {
                        for (_, q) in sched.namespaces.iter_mut() {
                            if q.event.remove(proc_id) {
                                return true;
                            }
                        }
                    }
                    sched.tables[id].regions.clone()
                };
                // region events sit behind the table's own monitor
                let removed = region_map.lock().remove_waiter(proc_id);
                removed
            }
            Some(ProcedureScope::Server { server, .. }) => {
                let mut guard = self.sched.lock();
                let sched = &mut *guard;
                let bucket = server_bucket(server);
                let Some(&id) = sched.server_buckets[bucket].get(server) else {
                    return false;
                };
                sched.servers[id].event.remove(proc_id)
            }
            None => false,
        }
    }

    fn wake_poll_if_needed(&self, count: usize) {
        match count {
            0 => {}
            1 => {
                self.poll_cond.notify_one();
            }
            _ => {
                self.poll_cond.notify_all();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling state (everything under the scheduler mutex)
// ---------------------------------------------------------------------------

struct Sched {
    running: bool,
    config: SchedulerConfig,
    tables: Arena<TableQueue>,
    servers: Arena<ServerQueue>,
    namespaces: Arena<NamespaceQueue>,
    table_index: BTreeMap<TableName, Idx<TableQueue>>,
    namespace_index: BTreeMap<String, Idx<NamespaceQueue>>,
    server_buckets: Box<[BTreeMap<ServerName, Idx<ServerQueue>>; SERVER_BUCKETS]>,
    table_run_queue: FairQueue<TableQueue>,
    server_run_queue: FairQueue<ServerQueue>,
}

enum Target {
    Table(Idx<TableQueue>),
    Server(Idx<ServerQueue>),
}

impl Sched {
    fn enqueue(&mut self, proc: ProcedureRef, add_front: bool) {
        let target = match proc.scope() {
            Some(ProcedureScope::Table { table, .. }) => Target::Table(self.table_queue(table)),
            Some(ProcedureScope::Server { server, .. }) => Target::Server(self.server_queue(server)),
            None => panic!("procedure without a table or server scope cannot be scheduled: {proc:?}"),
        };
        match target {
            Target::Table(id) => {
                do_add(&mut self.table_run_queue, &mut self.tables, id, proc, add_front);
            }
            Target::Server(id) => {
                do_add(&mut self.server_run_queue, &mut self.servers, id, proc, add_front);
            }
        }
    }

    fn dequeue(&mut self) -> Option<ProcedureRef> {
        // crashed-server recovery preempts table admin work
        self.poll_server().or_else(|| self.poll_table())
    }

    fn poll_server(&mut self) -> Option<ProcedureRef> {
        do_poll(
            &mut self.server_run_queue,
            &mut self.servers,
            |_, q: &ServerQueue| q.is_available(),
            |_, proc| match proc.scope() {
                Some(ProcedureScope::Server { op, .. }) => requires_server_exclusive_lock(op),
                _ => panic!("non-server procedure in a server queue: {proc:?}"),
            },
        )
    }

    fn poll_table(&mut self) -> Option<ProcedureRef> {
        let namespaces = &self.namespaces;
        do_poll(
            &mut self.table_run_queue,
            &mut self.tables,
            |_, q: &TableQueue| q.is_available(namespaces),
            |q: &TableQueue, proc| match proc.scope() {
                Some(ProcedureScope::Table { op, .. }) => requires_table_exclusive_lock(op, &q.key),
                _ => panic!("non-table procedure in a table queue: {proc:?}"),
            },
        )
    }

    /// Re-enqueue a procedure released from a wait queue, at the front of
    /// its entity queue.
    fn wake_procedure(&mut self, proc: ProcedureRef) {
        trace!(proc = %proc.proc_id(), "waking procedure");
        let target = match proc.scope() {
            Some(ProcedureScope::Table { table, .. }) => Target::Table(self.table_queue(table)),
            Some(ProcedureScope::Server { server, .. }) => Target::Server(self.server_queue(server)),
            None => unreachable!("unscoped procedure cannot have been suspended"),
        };
        match target {
            Target::Table(id) => {
                do_add(&mut self.table_run_queue, &mut self.tables, id, proc, true);
            }
            Target::Server(id) => {
                do_add(&mut self.server_run_queue, &mut self.servers, id, proc, true);
            }
        }
    }

    fn wait_table_queue_shared_lock(
        &mut self,
        proc: &ProcedureRef,
        table: &TableName,
    ) -> Option<Idx<TableQueue>> {
        let holder = LockHolder::of(&**proc);
        let id = self.table_queue(table);
        let ns = self.tables[id].namespace;
        if !self.namespaces[ns].lock.try_shared() {
            trace!(proc = %holder.id(), table = %table, "suspended on namespace lock");
            self.namespaces[ns].event.suspend(proc.clone());
            return None;
        }
        if !self.tables[id].lock.try_shared() {
            trace!(proc = %holder.id(), table = %table, "suspended on table shared lock");
            self.namespaces[ns].lock.release_shared();
            self.tables[id].event.suspend(proc.clone());
            return None;
        }
        Some(id)
    }

    /// Release one shared hold on the table and its namespace; returns the
    /// number of procedures woken.
    fn wake_table_shared(&mut self, table: &TableName) -> usize {
        let id = self.table_queue(table);
        let ns = self.tables[id].namespace;
        let mut woken: Vec<ProcedureRef> = Vec::new();
        if self.tables[id].lock.release_shared() {
            add_to_run_queue(&mut self.table_run_queue, &mut self.tables, id);
            woken.extend(self.tables[id].event.drain());
        }
        if self.namespaces[ns].lock.release_shared() {
            woken.extend(self.namespaces[ns].event.drain());
        }
        let count = woken.len();
        for p in woken {
            self.wake_procedure(p);
        }
        count
    }

    // -- queue lookup (lazily creating) --

    fn table_queue(&mut self, table: &TableName) -> Idx<TableQueue> {
        if let Some(&id) = self.table_index.get(table) {
            return id;
        }
        let ns = self.namespace_queue(table.namespace());
        let priority = self.config.table_priority(table);
        let id = self.tables.insert(TableQueue::new(table.clone(), ns, priority));
        self.table_index.insert(table.clone(), id);
        debug!(table = %table, priority, "created table queue");
        id
    }

    fn namespace_queue(&mut self, namespace: &str) -> Idx<NamespaceQueue> {
        if let Some(&id) = self.namespace_index.get(namespace) {
            return id;
        }
        let id = self.namespaces.insert(NamespaceQueue::new(namespace.to_owned()));
        self.namespace_index.insert(namespace.to_owned(), id);
        debug!(namespace, "created namespace queue");
        id
    }

    fn server_queue(&mut self, server: &ServerName) -> Idx<ServerQueue> {
        let bucket = server_bucket(server);
        if let Some(&id) = self.server_buckets[bucket].get(server) {
            return id;
        }
        let id = self.servers.insert(ServerQueue::new(server.clone()));
        self.server_buckets[bucket].insert(server.clone(), id);
        debug!(server = %server, bucket, "created server queue");
        id
    }
}

fn server_bucket(server: &ServerName) -> usize {
    let mut hasher = DefaultHasher::new();
    server.hash(&mut hasher);
    (hasher.finish() as usize) % SERVER_BUCKETS
}

// ---------------------------------------------------------------------------
// Generic enqueue / dispatch over table and server queues
// ---------------------------------------------------------------------------

fn add_to_run_queue<Q: DispatchQueue>(fair: &mut FairQueue<Q>, arena: &mut Arena<Q>, id: Idx<Q>) {
    if !arena[id].run_link().is_linked() && !arena[id].fifo().is_empty() {
        fair.add(arena, id);
    }
}

fn remove_from_run_queue<Q: DispatchQueue>(
    fair: &mut FairQueue<Q>,
    arena: &mut Arena<Q>,
    id: Idx<Q>,
) {
    if arena[id].run_link().is_linked() {
        fair.remove(arena, id);
    }
}

fn do_add<Q: DispatchQueue>(
    fair: &mut FairQueue<Q>,
    arena: &mut Arena<Q>,
    id: Idx<Q>,
    proc: ProcedureRef,
    add_front: bool,
) {
    let holder = LockHolder::of(&*proc);
    arena[id].fifo_mut().add(proc, add_front);
    let relink = {
        let lock = arena[id].lock();
        if !lock.has_exclusive() || lock.is_owner(holder.id()) {
            // the queue is not parked for an xlock execution, or the
            // enqueued procedure is the lock owner itself
            true
        } else if lock.has_parent_lock(&holder) {
            // the parent has the xlock and the queue is parked; re-link so
            // the child can run inheriting the lock
            assert!(
                add_front,
                "a child of the lock owner must be enqueued at the front"
            );
            true
        } else {
            // waits in the FIFO behind the xlock holder
            false
        }
    };
    if relink {
        add_to_run_queue(fair, arena, id);
    }
}

fn do_poll<Q: DispatchQueue>(
    fair: &mut FairQueue<Q>,
    arena: &mut Arena<Q>,
    available: impl Fn(Idx<Q>, &Q) -> bool,
    requires_xlock: impl Fn(&Q, &dyn Procedure) -> bool,
) -> Option<ProcedureRef> {
    let id = fair.poll(arena, &available)?;
    if !available(id, &arena[id]) {
        return None;
    }

    let head = arena[id].fifo().peek().cloned()?;
    let holder = LockHolder::of(&*head);
    let xlock_req = requires_xlock(&arena[id], &*head);
    {
        let lock = arena[id].lock();
        if xlock_req && lock.is_locked() && !lock.has_lock_access(&holder) {
            // someone already holds the lock (e.g. a shared holder); unlink
            // the queue instead of letting the executor spin on a yield loop
            remove_from_run_queue(fair, arena, id);
            return None;
        }
    }

    let proc = arena[id]
        .fifo_mut()
        .poll()
        .expect("available queue has a head");
    if arena[id].fifo().is_empty() || xlock_req {
        remove_from_run_queue(fair, arena, id);
    } else if arena[id].lock().has_parent_lock(&holder) {
        // the queue is linked only to run the xlock owner's children; once
        // the next head is not a sibling, park it again
        let unlink = match arena[id].fifo().peek() {
            Some(next) => !have_same_parent(&**next, &*proc),
            None => false,
        };
        if unlink {
            remove_from_run_queue(fair, arena, id);
        }
    }
    Some(proc)
}
