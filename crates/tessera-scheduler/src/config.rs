//! Scheduler configuration knobs.

use tessera_types::TableName;

/// Priorities driving the fair queue's per-table quantum.
///
/// A queue's priority buys it that many consecutive dispatches per fair
/// rotation. Read once when the scheduler is constructed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quantum of the meta table queue (`master.scheduler.meta.table.priority`).
    pub meta_table_priority: u32,
    /// Quantum of other system table queues (`master.scheduler.system.table.priority`).
    pub system_table_priority: u32,
    /// Quantum of user table queues (`master.scheduler.user.table.priority`).
    pub user_table_priority: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            meta_table_priority: 3,
            system_table_priority: 2,
            user_table_priority: 1,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Priority class of `table`: meta, system, or user.
    #[must_use]
    pub fn table_priority(&self, table: &TableName) -> u32 {
        if table.is_meta() {
            self.meta_table_priority
        } else if table.is_system() {
            self.system_table_priority
        } else {
            self.user_table_priority
        }
    }
}
