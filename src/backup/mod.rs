//! Durable storage for backup artifacts.
//!
//! Artifacts live under one capability-scoped directory. Writes go to a
//! temporary sibling first and are renamed into place, so an interrupted
//! backup never replaces or truncates an earlier artifact.

mod storage;

pub use storage::{BackupStorage, StorageError};
