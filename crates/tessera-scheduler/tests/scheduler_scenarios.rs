//! End-to-end scheduler scenarios driven through the public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tessera_error::MasterError;
use tessera_scheduler::{MasterProcedureScheduler, Procedure, ProcedureRef, ProcedureScope};
use tessera_types::{
    ProcId, RegionInfo, ServerName, ServerOperation, TableName, TableOperation,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockScope {
    Table(TableName, TableOperation),
    Server(ServerName, ServerOperation),
}

#[derive(Debug, Clone)]
struct MockProcedure {
    id: ProcId,
    parent: Option<ProcId>,
    root: Option<ProcId>,
    scope: MockScope,
    error: Option<MasterError>,
}

impl MockProcedure {
    fn table(id: u64, table: TableName, op: TableOperation) -> Self {
        Self {
            id: ProcId::new(id),
            parent: None,
            root: None,
            scope: MockScope::Table(table, op),
            error: None,
        }
    }

    fn server(id: u64, server: ServerName, op: ServerOperation) -> Self {
        Self {
            id: ProcId::new(id),
            parent: None,
            root: None,
            scope: MockScope::Server(server, op),
            error: None,
        }
    }

    fn child_of(mut self, parent: u64) -> Self {
        self.parent = Some(ProcId::new(parent));
        self.root = Some(ProcId::new(parent));
        self
    }

    fn failed_with(mut self, error: MasterError) -> Self {
        self.error = Some(error);
        self
    }

    fn build(self) -> ProcedureRef {
        Arc::new(self)
    }
}

impl Procedure for MockProcedure {
    fn proc_id(&self) -> ProcId {
        self.id
    }

    fn parent_proc_id(&self) -> Option<ProcId> {
        self.parent
    }

    fn root_proc_id(&self) -> Option<ProcId> {
        self.root
    }

    fn scope(&self) -> Option<ProcedureScope<'_>> {
        match &self.scope {
            MockScope::Table(table, op) => Some(ProcedureScope::Table { table, op: *op }),
            MockScope::Server(server, op) => Some(ProcedureScope::Server { server, op: *op }),
        }
    }

    fn terminal_error(&self) -> Option<&MasterError> {
        self.error.as_ref()
    }
}

fn dequeue_id(sched: &MasterProcedureScheduler) -> u64 {
    sched
        .dequeue()
        .expect("expected a dispatchable procedure")
        .proc_id()
        .get()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// A table's whole life: create under xlock with a child assigning regions
/// under the inherited lock, concurrent readers afterwards, then delete and
/// completion cleanup.
#[test]
fn table_lifecycle_create_assign_read_delete() {
    let sched = MasterProcedureScheduler::default();
    let t = TableName::user("orders");
    let r1 = RegionInfo::new(t.clone(), "r-aaa");
    let r2 = RegionInfo::new(t.clone(), "r-bbb");

    // create takes the table xlock
    sched.enqueue(
        MockProcedure::table(1, t.clone(), TableOperation::Create).build(),
        false,
    );
    let create = sched.dequeue().expect("create dispatchable");
    assert!(!sched.wait_table_exclusive_lock(&create, &t));

    // its child assigns regions without a table shared lock of its own
    let assign = MockProcedure::table(2, t.clone(), TableOperation::Assign)
        .child_of(1)
        .build();
    sched.enqueue(assign.clone(), true);
    let child = sched.dequeue().expect("child runs under the parent's lock");
    assert_eq!(child.proc_id().get(), 2);
    assert!(!sched.wait_table_exclusive_lock(&child, &t), "inherited");
    assert!(!sched.wait_regions(&child, &t, &mut [r2.clone(), r1.clone()]));
    sched.wake_regions(&child, &t, &mut [r1, r2]);
    sched.wake_table_exclusive_lock(&child, &t);

    // the parent still owns the table: a reader waits until it finishes
    let reader = MockProcedure::table(3, t.clone(), TableOperation::Read).build();
    assert!(sched.wait_table_shared_lock(&reader, &t));
    sched.wake_table_exclusive_lock(&create, &t);
    let reader = sched.dequeue().expect("reader woken by the parent's wake");
    assert_eq!(reader.proc_id().get(), 3);
    assert!(!sched.wait_table_shared_lock(&reader, &t));
    sched.wake_table_shared_lock(&reader, &t);

    // delete the table and clean up its queue
    let delete = MockProcedure::table(4, t.clone(), TableOperation::Delete).build();
    assert!(!sched.wait_table_exclusive_lock(&delete, &t));
    sched.wake_table_exclusive_lock(&delete, &t);
    sched.completion_cleanup(&delete);
    assert!(sched.mark_table_as_deleted(&t, &delete));
    assert_eq!(sched.size(), 0);
}

/// Crash handlers dispatch before any queued table work, whatever the
/// arrival order.
#[test]
fn crash_recovery_preempts_queued_table_work() {
    let sched = MasterProcedureScheduler::default();
    let s1 = ServerName::new("rs1.example.org", 16020, 100);
    let s2 = ServerName::new("rs2.example.org", 16020, 100);

    sched.enqueue(
        MockProcedure::table(1, TableName::user("a"), TableOperation::Create).build(),
        false,
    );
    sched.enqueue(
        MockProcedure::server(2, s1, ServerOperation::CrashHandler).build(),
        false,
    );
    sched.enqueue(
        MockProcedure::table(3, TableName::user("b"), TableOperation::Edit).build(),
        false,
    );
    sched.enqueue(
        MockProcedure::server(4, s2, ServerOperation::CrashHandler).build(),
        false,
    );

    let order: Vec<u64> = (0..4).map(|_| dequeue_id(&sched)).collect();
    assert_eq!(&order[..2], &[2, 4], "both crash handlers dispatch first");
    assert_eq!(&order[2..], &[1, 3]);
}

/// System tables get twice the consecutive dispatches of user tables under
/// the default configuration.
#[test]
fn system_table_priority_doubles_its_quantum() {
    let sched = MasterProcedureScheduler::default();
    let system = TableName::namespace_registry();
    let user = TableName::user("u");

    for i in 0..4 {
        sched.enqueue(
            MockProcedure::table(10 + i, system.clone(), TableOperation::Read).build(),
            false,
        );
    }
    for i in 0..2 {
        sched.enqueue(
            MockProcedure::table(20 + i, user.clone(), TableOperation::Read).build(),
            false,
        );
    }

    let mut pattern = Vec::new();
    for _ in 0..6 {
        let p = sched.dequeue().expect("runnable procedure");
        match p.scope() {
            Some(ProcedureScope::Table { table, .. }) => pattern.push(table.is_system()),
            other => panic!("unexpected scope {other:?}"),
        }
    }
    assert_eq!(pattern, vec![true, true, false, true, true, false]);
}

/// Region lock acquisition is order-insensitive: overlapping batches named
/// in opposite orders serialize instead of deadlocking.
#[test]
fn overlapping_region_batches_never_deadlock() {
    let sched = MasterProcedureScheduler::default();
    let t = TableName::user("t");
    let regions: Vec<RegionInfo> = (0..4)
        .map(|i| RegionInfo::new(t.clone(), format!("r{i}")))
        .collect();

    let p1 = MockProcedure::table(1, t.clone(), TableOperation::Merge).build();
    let p2 = MockProcedure::table(2, t.clone(), TableOperation::Merge).build();

    let mut batch_fwd = [regions[0].clone(), regions[1].clone(), regions[2].clone()];
    let mut batch_rev = [regions[3].clone(), regions[2].clone(), regions[1].clone()];

    assert!(!sched.wait_regions(&p1, &t, &mut batch_fwd));
    // p2 wants r1..r3 in reverse; it blocks on the first contended region
    // after sorting and holds nothing
    assert!(sched.wait_regions(&p2, &t, &mut batch_rev));

    sched.wake_regions(&p1, &t, &mut batch_fwd);
    let woken = sched.dequeue().expect("suspended batch woken");
    assert_eq!(woken.proc_id().get(), 2);
    assert!(!sched.wait_regions(&woken, &t, &mut batch_rev));
    sched.wake_regions(&woken, &t, &mut batch_rev);
    assert_eq!(sched.size(), 0);
}

/// wait/wake on an uncontended lock leaves the scheduler in its pre-state:
/// later traffic behaves exactly as on a fresh table.
#[test]
fn uncontended_wait_wake_round_trip_is_neutral() {
    let sched = MasterProcedureScheduler::default();
    let t = TableName::user("t");
    let p = MockProcedure::table(1, t.clone(), TableOperation::Create).build();

    assert!(!sched.wait_table_exclusive_lock(&p, &t));
    sched.wake_table_exclusive_lock(&p, &t);

    sched.enqueue(
        MockProcedure::table(2, t.clone(), TableOperation::Read).build(),
        false,
    );
    assert_eq!(dequeue_id(&sched), 2);
    assert_eq!(sched.size(), 0);
}

/// FIFO order within one table queue is preserved for back-pushed work.
#[test]
fn fifo_order_is_preserved_within_a_queue() {
    let sched = MasterProcedureScheduler::default();
    let t = TableName::user("t");
    for id in 1..=5 {
        sched.enqueue(
            MockProcedure::table(id, t.clone(), TableOperation::Read).build(),
            false,
        );
    }
    let order: Vec<u64> = (0..5).map(|_| dequeue_id(&sched)).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
}

/// A simulated executor: worker threads poll, lock, "execute", release.
/// Every create on the contended table runs exactly once and the exclusive
/// lock fully serializes them.
#[test]
fn worker_pool_serializes_creates_on_one_table() {
    const PROCS: u64 = 16;

    let sched = Arc::new(MasterProcedureScheduler::default());
    let t = TableName::user("hot");
    let executed = Arc::new(AtomicUsize::new(0));
    let in_section = Arc::new(AtomicUsize::new(0));

    for id in 1..=PROCS {
        sched.enqueue(
            MockProcedure::table(id, t.clone(), TableOperation::Create).build(),
            false,
        );
    }

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let sched = Arc::clone(&sched);
            let t = t.clone();
            let executed = Arc::clone(&executed);
            let in_section = Arc::clone(&in_section);
            std::thread::spawn(move || {
                while executed.load(Ordering::Acquire) < PROCS as usize {
                    let Some(proc) = sched.poll_timeout(Duration::from_millis(10)) else {
                        continue;
                    };
                    if sched.wait_table_exclusive_lock(&proc, &t) {
                        // suspended; it will be re-dispatched on wake
                        continue;
                    }
                    let concurrent = in_section.fetch_add(1, Ordering::AcqRel);
                    assert_eq!(concurrent, 0, "exclusive section violated");
                    std::thread::sleep(Duration::from_millis(1));
                    in_section.fetch_sub(1, Ordering::AcqRel);
                    executed.fetch_add(1, Ordering::AcqRel);
                    sched.wake_table_exclusive_lock(&proc, &t);
                    sched.completion_cleanup(&proc);
                }
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(30);
    while executed.load(Ordering::Acquire) < PROCS as usize {
        assert!(Instant::now() < deadline, "executor stalled");
        std::thread::sleep(Duration::from_millis(5));
    }
    sched.stop();
    for worker in workers {
        worker.join().expect("worker thread");
    }
    assert_eq!(executed.load(Ordering::Acquire), PROCS as usize);
    assert_eq!(sched.size(), 0);
}

/// A failed create on a table that already exists must leave the existing
/// table's queue (and therefore its future traffic) untouched.
#[test]
fn failed_duplicate_create_leaves_the_table_usable() {
    let sched = MasterProcedureScheduler::default();
    let t = TableName::user("t");

    sched.enqueue(
        MockProcedure::table(1, t.clone(), TableOperation::Read).build(),
        false,
    );

    let dup = MockProcedure::table(2, t.clone(), TableOperation::Create)
        .failed_with(MasterError::TableExists { name: t.clone() })
        .build();
    sched.completion_cleanup(&dup);

    // the queued read is still there and dispatchable
    assert_eq!(sched.size(), 1);
    assert_eq!(dequeue_id(&sched), 1);
}
