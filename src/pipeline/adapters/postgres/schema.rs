//! Diesel schema for pipeline persistence.

diesel::table! {
    /// Pipeline headers.
    pipelines (id) {
        /// Pipeline identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Optional issue reference.
        #[max_length = 255]
        issue_ref -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Stages in pipeline order.
    stages (id) {
        /// Stage identifier.
        id -> Uuid,
        /// Owning pipeline.
        pipeline_id -> Uuid,
        /// Zero-based position within the pipeline.
        position -> Int4,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Target environment name.
        #[max_length = 255]
        environment -> Varchar,
    }
}

diesel::table! {
    /// Tasks in stage order.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Owning pipeline.
        pipeline_id -> Uuid,
        /// Owning stage.
        stage_id -> Uuid,
        /// Zero-based position within the stage.
        position -> Int4,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Target instance.
        instance_id -> Uuid,
        /// Target database, if any.
        database_id -> Nullable<Uuid>,
        /// Task type name.
        #[max_length = 64]
        task_type -> Varchar,
        /// Typed payload.
        payload -> Jsonb,
        /// Lifecycle status.
        #[max_length = 16]
        status -> Varchar,
        /// Error from the latest failed run.
        error -> Nullable<Jsonb>,
        /// Result of the latest successful run.
        result -> Nullable<Jsonb>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// When the latest run started.
        started_at -> Nullable<Timestamptz>,
        /// When the latest run ended.
        completed_at -> Nullable<Timestamptz>,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only migration history.
    migration_history (id) {
        /// Entry identifier.
        id -> Uuid,
        /// Position in the per-database ledger.
        sequence -> Int8,
        /// Task that applied the change.
        task_id -> Uuid,
        /// Instance hosting the database.
        instance_id -> Uuid,
        /// Database name.
        #[max_length = 255]
        database_name -> Varchar,
        /// Optional issue reference.
        #[max_length = 255]
        issue_ref -> Nullable<Varchar>,
        /// Migration engine.
        #[max_length = 16]
        engine -> Varchar,
        /// Migration type.
        #[max_length = 16]
        migration_type -> Varchar,
        /// Declared version.
        #[max_length = 255]
        version -> Varchar,
        /// Description.
        description -> Text,
        /// Executed statement text.
        statement -> Text,
        /// Execution time in milliseconds.
        execution_duration_ms -> Int8,
        /// Extra details.
        payload -> Jsonb,
        /// Append timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only activity ledger.
    activities (id) {
        /// Entry identifier.
        id -> Uuid,
        /// Container kind.
        #[max_length = 16]
        container_type -> Varchar,
        /// Container identifier.
        #[max_length = 255]
        container_id -> Varchar,
        /// Activity type name.
        #[max_length = 64]
        activity_type -> Varchar,
        /// Severity.
        #[max_length = 16]
        level -> Varchar,
        /// Free-form comment.
        comment -> Text,
        /// Structured payload.
        payload -> Jsonb,
        /// Append timestamp.
        created_at -> Timestamptz,
    }
}
