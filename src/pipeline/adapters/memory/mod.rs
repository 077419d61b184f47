//! In-memory adapters for pipeline persistence and activities.

mod activity;
mod repository;

pub use activity::InMemoryActivitySink;
pub use repository::InMemoryPipelineRepository;
