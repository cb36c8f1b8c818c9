//! Error types for the Tessera master.

use tessera_types::{ProcId, ServerName, TableName};
use thiserror::Error;

/// Primary error type for master operations.
///
/// Procedures record a `MasterError` as their terminal error when they fail;
/// the scheduler's completion cleanup inspects the kind to decide whether a
/// table still exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MasterError {
    // === Table errors ===
    /// Table already exists (failed CREATE).
    #[error("table {name} already exists")]
    TableExists { name: TableName },

    /// Table does not exist.
    #[error("table {name} not found")]
    TableNotFound { name: TableName },

    /// Table must be disabled for the requested operation.
    #[error("table {name} is not disabled")]
    TableNotDisabled { name: TableName },

    /// Table must be enabled for the requested operation.
    #[error("table {name} is not enabled")]
    TableNotEnabled { name: TableName },

    // === Namespace errors ===
    /// Namespace already exists.
    #[error("namespace {name} already exists")]
    NamespaceExists { name: String },

    /// Namespace does not exist.
    #[error("namespace {name} not found")]
    NamespaceNotFound { name: String },

    /// Namespace still contains tables.
    #[error("namespace {name} is not empty")]
    NamespaceNotEmpty { name: String },

    // === Server errors ===
    /// Region server is not known to the master.
    #[error("server {name} is not online")]
    ServerNotOnline { name: ServerName },

    // === Procedure errors ===
    /// Procedure was aborted by an operator.
    #[error("{proc_id} aborted")]
    ProcedureAborted { proc_id: ProcId },

    /// Procedure failed for a reason the master does not classify.
    #[error("procedure failed: {detail}")]
    ProcedureFailed { detail: String },
}

impl MasterError {
    /// Whether this error means the target table exists.
    #[must_use]
    pub fn is_table_exists(&self) -> bool {
        matches!(self, Self::TableExists { .. })
    }

    /// Whether this error means the target table does not exist.
    #[must_use]
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound { .. })
    }
}
