//! `PostgreSQL` integration tests for the Diesel adapters.
//!
//! Tests share one embedded cluster started by `pg-embed-setup-unpriv`.
//! Each test clones a pre-migrated template into its own database and drops
//! it afterwards. When running as root, point `PG_EMBEDDED_WORKER` at a
//! `pg_worker` binary so the cluster can run unprivileged.
//!
//! - `catalog_tests`: instance and database registration, sync snapshots
//! - `pipeline_tests`: pipeline storage, task outcomes, migration history
//! - `activity_tests`: activity ledger round-trips

mod postgres {
    pub mod helpers;

    mod activity_tests;
    mod catalog_tests;
    mod pipeline_tests;
}
