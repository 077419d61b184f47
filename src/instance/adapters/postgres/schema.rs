//! Diesel schema for the metadata catalog.

diesel::table! {
    /// Registered instances and their sync bookkeeping.
    instances (id) {
        /// Instance identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Owning environment.
        #[max_length = 255]
        environment -> Varchar,
        /// Engine name.
        #[max_length = 16]
        engine -> Varchar,
        /// Host name.
        #[max_length = 255]
        host -> Varchar,
        /// TCP port.
        port -> Int4,
        /// Login user.
        #[max_length = 255]
        username -> Varchar,
        /// Login password.
        password -> Text,
        /// Outcome of the latest sync attempt.
        #[max_length = 16]
        sync_status -> Nullable<Varchar>,
        /// When the latest sync attempt started.
        last_sync_attempt_at -> Nullable<Timestamptz>,
        /// When the latest successful sync finished.
        last_successful_sync_at -> Nullable<Timestamptz>,
        /// Error from the latest failed attempt.
        last_sync_error -> Nullable<Text>,
    }
}

diesel::table! {
    /// Databases observed on instances.
    databases (id) {
        /// Database identifier.
        id -> Uuid,
        /// Owning instance.
        instance_id -> Uuid,
        /// Database name.
        #[max_length = 255]
        name -> Varchar,
        /// Default character set.
        #[max_length = 64]
        character_set -> Nullable<Varchar>,
        /// Default collation.
        #[max_length = 64]
        collation -> Nullable<Varchar>,
        /// Outcome of the latest sync touching this database.
        #[max_length = 16]
        sync_status -> Varchar,
        /// When the database was last seen.
        last_successful_sync_at -> Nullable<Timestamptz>,
        /// Backup period in hours, when backups are enabled.
        backup_period_hours -> Nullable<Int4>,
    }
}

diesel::table! {
    /// Cached table metadata.
    db_tables (database_id, name) {
        /// Owning database.
        database_id -> Uuid,
        /// Table name.
        #[max_length = 255]
        name -> Varchar,
        /// Full metadata including columns and indexes.
        metadata -> Jsonb,
        /// Outcome of the latest sync touching this table.
        #[max_length = 16]
        sync_status -> Varchar,
        /// When the table was last refreshed.
        last_successful_sync_at -> Timestamptz,
    }
}
