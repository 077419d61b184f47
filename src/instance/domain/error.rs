//! Error types for instance domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing instance domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstanceDomainError {
    /// The environment name is empty after trimming.
    #[error("environment name must not be empty")]
    EmptyEnvironmentName,

    /// The instance host is empty after trimming.
    #[error("instance host must not be empty")]
    EmptyHost,

    /// The database name is empty after trimming.
    #[error("database name must not be empty")]
    EmptyDatabaseName,

    /// A backup policy period of zero hours was requested.
    #[error("backup period must be at least one hour")]
    ZeroBackupPeriod,
}

/// Error returned while parsing an engine name from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown database engine: {0}")]
pub struct ParseEngineError(pub String);

/// Error returned while parsing a sync status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown sync status: {0}")]
pub struct ParseSyncStatusError(pub String);
