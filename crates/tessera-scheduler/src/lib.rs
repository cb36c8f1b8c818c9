//! Procedure scheduler for the Tessera master.
//!
//! The master executes long-running administrative procedures — create or
//! delete a table, enable/disable, reassign regions, recover a crashed
//! server — on a pool of executor workers. This crate decides *which
//! procedure runs next* and *under what mutual-exclusion guarantees*, so
//! that independent work (two creates on different tables, two crashed
//! servers) proceeds concurrently while conflicting work never corrupts
//! shared cluster state.
//!
//! Three mechanisms couple together:
//!
//! 1. **Fair, priority-weighted dispatch**: every table and every server
//!    gets its own FIFO of runnable procedures; a fair round robin rotates
//!    over the queues that currently have dispatchable work,
//!    giving each queue a run of consecutive dispatches proportional to its
//!    priority. Server queues preempt table queues.
//! 2. **Hierarchical reader/writer locks**: namespace → table → region,
//!    plus a per-server exclusive lock. A child procedure inherits lock
//!    access from the parent that owns the lock.
//! 3. **Suspension and wake**: a procedure that fails to take a lock is
//!    parked on the lock-holding entity's wait queue, at zero polling cost,
//!    and is re-enqueued exactly when the lock becomes available.
//!
//! The executor interacts with the scheduler only through
//! [`MasterProcedureScheduler`] and the [`Procedure`] trait; procedure
//! state, durability, and execution are out of scope here.

mod arena;
mod config;
mod event;
mod fair;
mod lock;
mod procedure;
mod queue;
mod scheduler;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::SchedulerConfig;
pub use procedure::{have_same_parent, Procedure, ProcedureRef, ProcedureScope};
pub use scheduler::MasterProcedureScheduler;
