//! Procedure identifiers.

use std::fmt;

/// Unique identifier of an administrative procedure.
///
/// Assigned by the procedure executor when a procedure is submitted and
/// stable across restarts (the procedure store persists it). The scheduler
/// uses it as the lock-owner identity for exclusive locks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ProcId(u64);

impl ProcId {
    /// Construct a `ProcId` from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc#{}", self.0)
    }
}

impl From<u64> for ProcId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
