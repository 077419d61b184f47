//! In-memory catalog and scripted driver for tests and local runs.

mod catalog;
mod driver;

pub use catalog::InMemoryMetadataCatalog;
pub use driver::{ExecutedStatement, InMemoryDriver, InstanceBehaviour};
