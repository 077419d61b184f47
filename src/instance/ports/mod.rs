//! Port contracts for instance metadata and live instance access.

pub mod catalog;
pub mod driver;

pub use catalog::{CatalogError, CatalogResult, MetadataCatalog};
pub use driver::{DriverError, DriverResult, InstanceDriver};
