//! `PostgreSQL` adapters for pipeline persistence and activities.

mod activity;
mod models;
mod repository;
mod schema;

pub use activity::PostgresActivitySink;
pub use repository::PostgresPipelineRepository;
