//! Shared helpers for `PostgreSQL` integration tests.

use chrono::{DateTime, Local, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use eyre::{Result, eyre};
pub use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use schemaflow::instance::domain::{ConnectionInfo, Engine, EnvironmentName, Instance};
use schemaflow::pg::{PgPool, build_pool};
use std::future::Future;
use uuid::Uuid;

/// SQL creating the metadata catalog tables.
pub const CREATE_CATALOG_SQL: &str =
    include_str!("../../migrations/2024-03-01-000000_create_catalog/up.sql");

/// SQL creating the pipeline, history, and activity tables.
pub const CREATE_PIPELINES_SQL: &str =
    include_str!("../../migrations/2024-03-01-000100_create_pipelines/up.sql");

/// Template database holding the migrated schema.
pub const TEMPLATE_DB: &str = "schemaflow_test_template";

/// Drives an async test body to completion on a fresh runtime.
///
/// # Errors
///
/// Returns the body's error, or an error when the runtime cannot start.
pub fn block_on<F>(body: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(body)
}

/// Creates the template database with every migration applied, once per
/// cluster.
///
/// # Errors
///
/// Returns an error when the template cannot be created or migrated.
pub fn ensure_template(cluster: &TestCluster) -> Result<()> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre!("{e}"))?;
            conn.batch_execute(CREATE_CATALOG_SQL)
                .map_err(|e| eyre!("catalog migration: {e}"))?;
            conn.batch_execute(CREATE_PIPELINES_SQL)
                .map_err(|e| eyre!("pipeline migration: {e}"))?;
            Ok(())
        })
        .map_err(|err| eyre!("template setup failed: {err}"))
}

/// Database cloned from the template for one test, dropped with the value.
pub struct TestDatabase {
    cluster: &'static TestCluster,
    name: String,
    pool: Option<PgPool>,
}

impl TestDatabase {
    /// Clones the template into a uniquely named database.
    ///
    /// # Errors
    ///
    /// Returns an error when the template or the clone cannot be created,
    /// or the pool cannot connect.
    pub fn create(cluster: &'static TestCluster, label: &str) -> Result<Self> {
        ensure_template(cluster)?;
        let name = format!("test_{label}_{}", Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|err| eyre!("failed to create {name}: {err}"))?;
        let mut database = Self {
            cluster,
            name,
            pool: None,
        };
        let url = cluster.connection().database_url(&database.name);
        database.pool = Some(build_pool(&url, 2)?);
        Ok(database)
    }

    /// Returns a pool connected to the test database.
    ///
    /// # Errors
    ///
    /// Returns an error once the database is being dropped.
    pub fn pool(&self) -> Result<PgPool> {
        self.pool
            .clone()
            .ok_or_else(|| eyre!("database {} already released", self.name))
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        drop(self.pool.take());
        if let Err(err) = self.cluster.drop_database(self.name.as_str()) {
            tracing::warn!(database = %self.name, error = %err, "test database not dropped");
        }
    }
}

/// Builds an unregistered `MySQL` instance in the `prod` environment.
///
/// # Errors
///
/// Returns an error when the fixed sample values fail validation.
pub fn sample_instance(name: &str) -> Result<Instance> {
    Ok(Instance::new(
        name,
        EnvironmentName::new("prod")?,
        Engine::MySql,
        ConnectionInfo::new("db.internal", 3306, "admin", "secret")?,
    ))
}

/// Clock pinned to a whole-second instant so timestamps survive the
/// microsecond precision of `TIMESTAMPTZ` unchanged.
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Pins the clock to 2024-03-01 09:00:00 UTC.
    #[must_use]
    pub fn pinned() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_default())
    }

    /// Returns the pinned instant.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl mockable::Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}
