//! Table, server, and region naming.

use std::fmt;

/// Namespace reserved for Tessera's own bookkeeping tables.
pub const SYSTEM_NAMESPACE: &str = "system";

/// Namespace used for tables created without an explicit namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

const META_QUALIFIER: &str = "meta";
const NAMESPACE_QUALIFIER: &str = "namespace";

/// Fully-qualified table name: `namespace:qualifier`.
///
/// Ordering is namespace-first so that ordered indexes group tables of the
/// same namespace together.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TableName {
    namespace: String,
    qualifier: String,
}

impl TableName {
    /// A table in an explicit namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            qualifier: qualifier.into(),
        }
    }

    /// A user table in the default namespace.
    #[must_use]
    pub fn user(qualifier: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, qualifier)
    }

    /// The meta table (`system:meta`), holding the region directory.
    #[must_use]
    pub fn meta() -> Self {
        Self::new(SYSTEM_NAMESPACE, META_QUALIFIER)
    }

    /// The namespace registry table (`system:namespace`).
    ///
    /// Namespace create/alter/drop procedures edit rows of this table, so
    /// namespace-level exclusive locks bridge through its shared lock.
    #[must_use]
    pub fn namespace_registry() -> Self {
        Self::new(SYSTEM_NAMESPACE, NAMESPACE_QUALIFIER)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Whether this table lives in the system namespace.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.namespace == SYSTEM_NAMESPACE
    }

    /// Whether this is the meta table.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.is_system() && self.qualifier == META_QUALIFIER
    }

    /// Whether this is the namespace registry table.
    #[must_use]
    pub fn is_namespace_registry(&self) -> bool {
        self.is_system() && self.qualifier == NAMESPACE_QUALIFIER
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.qualifier)
    }
}

/// Identity of a region server: host, port, and the start code that
/// distinguishes restarts of the same host/port pair.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ServerName {
    host: String,
    port: u16,
    start_code: u64,
}

impl ServerName {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, start_code: u64) -> Self {
        Self {
            host: host.into(),
            port,
            start_code,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn start_code(&self) -> u64 {
        self.start_code
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.host, self.port, self.start_code)
    }
}

/// Descriptor of one region of a table.
///
/// The encoded name is unique within the table and is what region-level
/// locks key on. Ordering is (table, encoded name), which gives region
/// batches a single global acquisition order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RegionInfo {
    table: TableName,
    encoded_name: String,
}

impl RegionInfo {
    #[must_use]
    pub fn new(table: TableName, encoded_name: impl Into<String>) -> Self {
        Self {
            table,
            encoded_name: encoded_name.into(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    #[must_use]
    pub fn encoded_name(&self) -> &str {
        &self.encoded_name
    }
}

impl fmt::Display for RegionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.encoded_name)
    }
}
