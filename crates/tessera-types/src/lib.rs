//! Shared vocabulary types for the Tessera table store.
//!
//! This crate defines the identifiers and names that cross component
//! boundaries in a Tessera master: procedure identifiers, table and server
//! names, region descriptors, and the administrative operation kinds the
//! master scheduler classifies procedures by.
//!
//! Everything here is plain data: cheap to clone, totally ordered where a
//! component needs ordered lookup, and serde-serializable because these
//! identifiers travel through the procedure store and over the wire in the
//! wider system.

mod ids;
mod names;
mod ops;

pub use ids::ProcId;
pub use names::{RegionInfo, ServerName, TableName, DEFAULT_NAMESPACE, SYSTEM_NAMESPACE};
pub use ops::{ServerOperation, TableOperation};
