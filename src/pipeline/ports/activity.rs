//! Sink port for the append-only activity ledger.

use crate::pipeline::domain::Activity;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Append-only destination for activities.
///
/// Callers treat recording as fire-and-forget: a failed write is logged and
/// never fails the operation that produced the activity.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Appends one activity.
    ///
    /// # Errors
    ///
    /// Returns [`ActivitySinkError::Persistence`] when the write fails.
    async fn record(&self, activity: &Activity) -> Result<(), ActivitySinkError>;
}

/// Errors returned by activity sinks.
#[derive(Debug, Clone, Error)]
pub enum ActivitySinkError {
    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ActivitySinkError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
