//! Administrative operation kinds.
//!
//! Every master procedure declares the kind of operation it performs on its
//! target entity; the scheduler decides lock requirements from the kind
//! alone, without knowing the procedure's implementation.

use std::fmt;

/// Operation a table-scoped procedure performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum TableOperation {
    Create,
    Delete,
    Enable,
    Disable,
    /// Schema or attribute change.
    Edit,
    Read,
    /// Region operations take the table's shared lock plus region locks.
    Split,
    Merge,
    Assign,
    Unassign,
    RegionEdit,
}

impl fmt::Display for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Enable => "ENABLE",
            Self::Disable => "DISABLE",
            Self::Edit => "EDIT",
            Self::Read => "READ",
            Self::Split => "SPLIT",
            Self::Merge => "MERGE",
            Self::Assign => "ASSIGN",
            Self::Unassign => "UNASSIGN",
            Self::RegionEdit => "REGION_EDIT",
        };
        f.write_str(s)
    }
}

/// Operation a server-scoped procedure performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ServerOperation {
    /// Recovery of a crashed region server.
    CrashHandler,
}

impl fmt::Display for ServerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrashHandler => f.write_str("CRASH_HANDLER"),
        }
    }
}
