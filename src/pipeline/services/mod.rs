//! Service layer for pipeline scheduling.

mod running;
mod scheduler;

pub use scheduler::{
    CancelOutcome, OutcomeRetry, SchedulerError, SchedulerOptions, SchedulerResult, TaskScheduler,
};
