//! `PostgreSQL` adapter for the metadata catalog.

mod catalog;
mod models;
mod schema;

pub use catalog::PostgresMetadataCatalog;
