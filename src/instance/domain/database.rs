//! Databases hosted on an instance.

use super::{DatabaseId, InstanceDomainError, InstanceId, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requested or observed database-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    name: String,
    character_set: Option<String>,
    collation: Option<String>,
}

impl DatabaseDefinition {
    /// Creates a definition for the named database.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceDomainError::EmptyDatabaseName`] when the name is
    /// blank.
    pub fn new(
        database_name: impl Into<String>,
        character_set: Option<String>,
        collation: Option<String>,
    ) -> Result<Self, InstanceDomainError> {
        let name = database_name.into().trim().to_owned();
        if name.is_empty() {
            return Err(InstanceDomainError::EmptyDatabaseName);
        }
        Ok(Self {
            name,
            character_set: non_blank(character_set),
            collation: non_blank(collation),
        })
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default character set, if specified.
    #[must_use]
    pub fn character_set(&self) -> Option<&str> {
        self.character_set.as_deref()
    }

    /// Returns the default collation, if specified.
    #[must_use]
    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Returns whether an existing database satisfies this request.
    ///
    /// Settings left unspecified in the request match anything.
    #[must_use]
    pub fn is_satisfied_by(&self, existing: &Self) -> bool {
        fn setting_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
            wanted.is_none_or(|value| actual.is_some_and(|found| found.eq_ignore_ascii_case(value)))
        }

        self.name == existing.name
            && setting_matches(self.character_set(), existing.character_set())
            && setting_matches(self.collation(), existing.collation())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Periodic backup schedule for a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    period_hours: u32,
}

impl BackupPolicy {
    /// Creates a policy that backs up every `period_hours` hours.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceDomainError::ZeroBackupPeriod`] for a zero period.
    pub const fn every_hours(period_hours: u32) -> Result<Self, InstanceDomainError> {
        if period_hours == 0 {
            return Err(InstanceDomainError::ZeroBackupPeriod);
        }
        Ok(Self { period_hours })
    }

    /// Returns the period in hours.
    #[must_use]
    pub const fn period_hours(self) -> u32 {
        self.period_hours
    }

    /// Returns the period as a duration.
    #[must_use]
    pub fn period(self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.period_hours))
    }

    /// Returns whether a backup taken at `last_backup` is stale at `now`.
    #[must_use]
    pub fn is_due(self, last_backup: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_backup.is_none_or(|taken| now - taken >= self.period())
    }
}

/// Parameter object for reconstructing a persisted database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedDatabaseData {
    /// Persisted database identifier.
    pub id: DatabaseId,
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Observed database settings.
    pub definition: DatabaseDefinition,
    /// Outcome of the latest sync touching this database.
    pub sync_status: SyncStatus,
    /// When the database was last seen by a successful sync.
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    /// Backup schedule, when periodic backups are enabled.
    pub backup_policy: Option<BackupPolicy>,
}

/// Database hosted on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    id: DatabaseId,
    instance_id: InstanceId,
    definition: DatabaseDefinition,
    sync_status: SyncStatus,
    last_successful_sync_at: Option<DateTime<Utc>>,
    backup_policy: Option<BackupPolicy>,
}

impl Database {
    /// Registers a database observed on the given instance.
    #[must_use]
    pub fn new(instance_id: InstanceId, definition: DatabaseDefinition) -> Self {
        Self {
            id: DatabaseId::new(),
            instance_id,
            definition,
            sync_status: SyncStatus::Ok,
            last_successful_sync_at: None,
            backup_policy: None,
        }
    }

    /// Reconstructs a database from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedDatabaseData) -> Self {
        Self {
            id: data.id,
            instance_id: data.instance_id,
            definition: data.definition,
            sync_status: data.sync_status,
            last_successful_sync_at: data.last_successful_sync_at,
            backup_policy: data.backup_policy,
        }
    }

    /// Returns a copy with the given backup schedule.
    #[must_use]
    pub fn with_backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = Some(policy);
        self
    }

    /// Returns the database identifier.
    #[must_use]
    pub const fn id(&self) -> DatabaseId {
        self.id
    }

    /// Returns the owning instance identifier.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Returns the observed settings.
    #[must_use]
    pub const fn definition(&self) -> &DatabaseDefinition {
        &self.definition
    }

    /// Returns the latest sync outcome.
    #[must_use]
    pub const fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Returns when the database was last seen by a successful sync.
    #[must_use]
    pub const fn last_successful_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_successful_sync_at
    }

    /// Returns the backup schedule, if any.
    #[must_use]
    pub const fn backup_policy(&self) -> Option<BackupPolicy> {
        self.backup_policy
    }

    /// Applies a fresh observation from a successful sync.
    pub fn mark_synced(&mut self, definition: DatabaseDefinition, at: DateTime<Utc>) {
        self.definition = definition;
        self.sync_status = SyncStatus::Ok;
        self.last_successful_sync_at = Some(at);
    }

    /// Marks the database as missing from the latest snapshot.
    pub const fn mark_not_found(&mut self) {
        self.sync_status = SyncStatus::NotFound;
    }
}
