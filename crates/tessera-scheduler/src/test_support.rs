//! Procedure fixture shared by the unit tests.

use tessera_error::MasterError;
use tessera_types::{
    ProcId, ServerName, ServerOperation, TableName, TableOperation,
};

use crate::procedure::{Procedure, ProcedureScope};

#[derive(Debug, Clone)]
enum ScopeData {
    Table { table: TableName, op: TableOperation },
    Server { server: ServerName, op: ServerOperation },
    None,
}

/// Minimal [`Procedure`] implementation for tests.
#[derive(Debug, Clone)]
pub(crate) struct TestProcedure {
    id: ProcId,
    parent: Option<ProcId>,
    root: Option<ProcId>,
    scope: ScopeData,
    error: Option<MasterError>,
}

impl TestProcedure {
    /// A user-table procedure (`default:<qualifier>`).
    pub(crate) fn table(id: u64, qualifier: &str, op: TableOperation) -> Self {
        Self::table_named(id, TableName::user(qualifier), op)
    }

    pub(crate) fn table_named(id: u64, table: TableName, op: TableOperation) -> Self {
        Self {
            id: ProcId::new(id),
            parent: None,
            root: None,
            scope: ScopeData::Table { table, op },
            error: None,
        }
    }

    pub(crate) fn server(id: u64, server: ServerName, op: ServerOperation) -> Self {
        Self {
            id: ProcId::new(id),
            parent: None,
            root: None,
            scope: ScopeData::Server { server, op },
            error: None,
        }
    }

    /// A procedure with no scope at all (rejected by `enqueue`).
    pub(crate) fn unscoped(id: u64) -> Self {
        Self {
            id: ProcId::new(id),
            parent: None,
            root: None,
            scope: ScopeData::None,
            error: None,
        }
    }

    pub(crate) fn with_parent(mut self, parent: u64, root: u64) -> Self {
        self.parent = Some(ProcId::new(parent));
        self.root = Some(ProcId::new(root));
        self
    }

    pub(crate) fn with_error(mut self, error: MasterError) -> Self {
        self.error = Some(error);
        self
    }
}

impl Procedure for TestProcedure {
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
            ScopeData::Table { table, op } => Some(ProcedureScope::Table { table, op: *op }),
            ScopeData::Server { server, op } => Some(ProcedureScope::Server { server, op: *op }),
            ScopeData::None => None,
        }
    }

    fn terminal_error(&self) -> Option<&MasterError> {
        self.error.as_ref()
    }
}
