//! Instance aggregate and its connection and sync state.

use super::{
    EnvironmentName, InstanceDomainError, InstanceId, ParseEngineError, ParseSyncStatusError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database engine running on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Engine {
    /// `MySQL` server.
    MySql,
    /// `TiDB` server speaking the `MySQL` wire protocol.
    TiDb,
}

impl Engine {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "MYSQL",
            Self::TiDb => "TIDB",
        }
    }
}

impl TryFrom<&str> for Engine {
    type Error = ParseEngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MYSQL" => Ok(Self::MySql),
            "TIDB" => Ok(Self::TiDb),
            _ => Err(ParseEngineError(value.to_owned())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent metadata sync for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// The object was present in the latest snapshot.
    Ok,
    /// The object disappeared from the instance.
    NotFound,
    /// The sync attempt failed before a snapshot was taken.
    Failed,
}

impl SyncStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::Failed => "FAILED",
        }
    }
}

impl TryFrom<&str> for SyncStatus {
    type Error = ParseSyncStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(Self::Ok),
            "NOT_FOUND" => Ok(Self::NotFound),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseSyncStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network location and credentials for an instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl ConnectionInfo {
    /// Creates connection details.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceDomainError::EmptyHost`] when the host is blank.
    pub fn new(
        host_name: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, InstanceDomainError> {
        let host = host_name.into().trim().to_owned();
        if host.is_empty() {
            return Err(InstanceDomainError::EmptyHost);
        }
        Ok(Self {
            host,
            port,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Returns the host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the login user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the login password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Instance-level sync bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSyncState {
    /// Outcome of the most recent attempt, if any attempt was made.
    pub status: Option<SyncStatus>,
    /// When the most recent attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the most recent successful snapshot was applied.
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
}

/// Database server registered for schema management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    id: InstanceId,
    name: String,
    environment: EnvironmentName,
    engine: Engine,
    connection: ConnectionInfo,
    sync: InstanceSyncState,
}

impl Instance {
    /// Registers a new instance that has never been synced.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        environment: EnvironmentName,
        engine: Engine,
        connection: ConnectionInfo,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            name: name.into(),
            environment,
            engine,
            connection,
            sync: InstanceSyncState::default(),
        }
    }

    /// Reconstructs an instance from persisted storage.
    #[must_use]
    pub const fn from_persisted(
        id: InstanceId,
        name: String,
        environment: EnvironmentName,
        engine: Engine,
        connection: ConnectionInfo,
        sync: InstanceSyncState,
    ) -> Self {
        Self {
            id,
            name,
            environment,
            engine,
            connection,
            sync,
        }
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning environment.
    #[must_use]
    pub const fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    /// Returns the database engine.
    #[must_use]
    pub const fn engine(&self) -> Engine {
        self.engine
    }

    /// Returns the connection details.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Returns the sync bookkeeping.
    #[must_use]
    pub const fn sync_state(&self) -> &InstanceSyncState {
        &self.sync
    }

    /// Records a successful snapshot.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.sync = InstanceSyncState {
            status: Some(SyncStatus::Ok),
            last_attempt_at: Some(at),
            last_successful_sync_at: Some(at),
            last_error: None,
        };
    }

    /// Records a failed attempt, keeping the last success timestamp.
    pub fn mark_sync_failed(&mut self, at: DateTime<Utc>, error: impl Into<String>) {
        self.sync.status = Some(SyncStatus::Failed);
        self.sync.last_attempt_at = Some(at);
        self.sync.last_error = Some(error.into());
    }
}
