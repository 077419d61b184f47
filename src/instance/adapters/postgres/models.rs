//! Diesel row models for the metadata catalog.

use super::schema::{databases, db_tables, instances};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// Query and insert row for instances.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = instances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InstanceRow {
    /// Instance identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Owning environment.
    pub environment: String,
    /// Engine name.
    pub engine: String,
    /// Host name.
    pub host: String,
    /// TCP port.
    pub port: i32,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Outcome of the latest sync attempt.
    pub sync_status: Option<String>,
    /// When the latest sync attempt started.
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    /// When the latest successful sync finished.
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    /// Error from the latest failed attempt.
    pub last_sync_error: Option<String>,
}

/// Query and insert row for databases.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = databases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DatabaseRow {
    /// Database identifier.
    pub id: Uuid,
    /// Owning instance.
    pub instance_id: Uuid,
    /// Database name.
    pub name: String,
    /// Default character set.
    pub character_set: Option<String>,
    /// Default collation.
    pub collation: Option<String>,
    /// Outcome of the latest sync.
    pub sync_status: String,
    /// When the database was last seen.
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    /// Backup period in hours.
    pub backup_period_hours: Option<i32>,
}

/// Query and insert row for cached tables.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = db_tables)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TableRow {
    /// Owning database.
    pub database_id: Uuid,
    /// Table name.
    pub name: String,
    /// Full metadata.
    pub metadata: Value,
    /// Outcome of the latest sync.
    pub sync_status: String,
    /// When the table was last refreshed.
    pub last_successful_sync_at: DateTime<Utc>,
}
