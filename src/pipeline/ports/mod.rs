//! Port contracts for pipeline persistence and the activity ledger.

pub mod activity;
pub mod repository;

pub use activity::{ActivitySink, ActivitySinkError};
pub use repository::{PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult};
