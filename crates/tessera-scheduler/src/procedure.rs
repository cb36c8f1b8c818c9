//! The contract between the procedure executor and the scheduler.

use std::fmt;
use std::sync::Arc;

use tessera_error::MasterError;
use tessera_types::{ProcId, ServerName, ServerOperation, TableName, TableOperation};

/// Scheduling-relevant view of a procedure: which entity it operates on and
/// what kind of operation it performs there.
///
/// A procedure exposes at most one scope. Procedures without a scope cannot
/// be scheduled — there is no FIFO-only fallback.
#[derive(Debug, Clone, Copy)]
pub enum ProcedureScope<'a> {
    /// Operates on a table (or on regions of that table).
    Table {
        table: &'a TableName,
        op: TableOperation,
    },
    /// Operates on a region server.
    Server {
        server: &'a ServerName,
        op: ServerOperation,
    },
}

/// A schedulable administrative procedure.
///
/// The scheduler treats procedures as opaque: it reads the identity triple
/// (own id, parent, root), the scope, and — at completion — the terminal
/// error. Everything else about a procedure belongs to the executor and the
/// procedure store.
pub trait Procedure: Send + Sync + fmt::Debug {
    /// Unique id of this procedure; lock ownership is recorded against it.
    fn proc_id(&self) -> ProcId;

    /// Id of the direct parent, if this procedure was spawned by another.
    fn parent_proc_id(&self) -> Option<ProcId> {
        None
    }

    /// Id of the root ancestor, if this procedure is part of a tree.
    fn root_proc_id(&self) -> Option<ProcId> {
        None
    }

    /// The entity this procedure operates on.
    fn scope(&self) -> Option<ProcedureScope<'_>>;

    /// Terminal error of a finished procedure, if it failed.
    fn terminal_error(&self) -> Option<&MasterError> {
        None
    }

    fn has_parent(&self) -> bool {
        self.parent_proc_id().is_some()
    }
}

/// Shared handle to a procedure, as held by the scheduler's queues.
pub type ProcedureRef = Arc<dyn Procedure>;

/// Whether two procedures are children of the same parent.
#[must_use]
pub fn have_same_parent(a: &dyn Procedure, b: &dyn Procedure) -> bool {
    match (a.parent_proc_id(), b.parent_proc_id()) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => false,
    }
}

/// Identity triple consulted by lock-inheritance checks.
///
/// Captured once per scheduler call so lock code does not chase the trait
/// object repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockHolder {
    id: ProcId,
    parent: Option<ProcId>,
    root: Option<ProcId>,
}

impl LockHolder {
    pub(crate) fn of(proc: &dyn Procedure) -> Self {
        Self {
            id: proc.proc_id(),
            parent: proc.parent_proc_id(),
            root: proc.root_proc_id(),
        }
    }

    pub(crate) fn id(&self) -> ProcId {
        self.id
    }

    pub(crate) fn parent(&self) -> Option<ProcId> {
        self.parent
    }

    pub(crate) fn root(&self) -> Option<ProcId> {
        self.root
    }

    pub(crate) fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}
