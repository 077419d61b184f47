//! Instances, databases, and their cached schema metadata.
//!
//! An instance is one database server reachable through its connection
//! details. The catalog keeps the databases found on each instance together
//! with table, column, and index metadata refreshed by the schema syncer.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;
