//! Background loops and the supervisor that owns them.
//!
//! Three loops run side by side, each on its own timer: the scheduler's
//! dispatch loop, the schema syncer, and the backup runner. They share one
//! cancellation token; shutdown stops the loops and, at the same time,
//! gives running executors a bounded grace period.

mod backup;
mod dispatch;
mod supervisor;
mod sync;

pub use backup::{BackupRunner, BackupRunnerError};
pub use dispatch::run_dispatch_loop;
pub use supervisor::{Runtime, RuntimeOptions};
pub use sync::{SchemaSyncer, SyncFailure, SyncReport};
