//! Connection handling and database creation for `MySQL`-protocol
//! instances.

use super::{dump, introspect, quote_identifier};
use crate::instance::{
    domain::{DatabaseDefinition, Instance, InstanceSchema},
    ports::{DriverError, DriverResult, InstanceDriver},
};
use crate::script::{ScriptConnection, StatementError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor, Row};
use std::time::Duration;
use tracing::debug;

const DEFINITION_QUERY: &str = "SELECT CAST(SCHEMA_NAME AS CHAR) AS name, \
     CAST(DEFAULT_CHARACTER_SET_NAME AS CHAR) AS character_set, \
     CAST(DEFAULT_COLLATION_NAME AS CHAR) AS collation_name \
     FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";

/// Driver for `MySQL` and `TiDB` instances.
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    connect_timeout: Duration,
}

impl MySqlDriver {
    /// Creates a driver that gives up on connecting after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub(super) async fn open(
        &self,
        instance: &Instance,
        database: Option<&str>,
    ) -> DriverResult<MySqlConnection> {
        let info = instance.connection();
        let base = MySqlConnectOptions::new()
            .host(info.host())
            .port(info.port())
            .username(info.username())
            .password(info.password());
        let options = match database {
            Some(name) => base.database(name),
            None => base,
        };

        debug!(instance = %instance.id(), host = info.host(), database, "opening connection");
        tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(DriverError::connection)?
            .map_err(DriverError::connection)
    }
}

#[async_trait]
impl InstanceDriver for MySqlDriver {
    async fn connect(
        &self,
        instance: &Instance,
        database: Option<&str>,
    ) -> DriverResult<Box<dyn ScriptConnection>> {
        let connection = self.open(instance, database).await?;
        Ok(Box::new(MySqlScriptConnection { connection }))
    }

    async fn database_definition(
        &self,
        instance: &Instance,
        name: &str,
    ) -> DriverResult<Option<DatabaseDefinition>> {
        let mut connection = self.open(instance, None).await?;
        let row = sqlx::query(DEFINITION_QUERY)
            .bind(name)
            .fetch_optional(&mut connection)
            .await
            .map_err(|err| DriverError::query(DEFINITION_QUERY, err))?;
        let Some(found) = row else {
            return Ok(None);
        };

        let decode = |err: sqlx::Error| DriverError::query(DEFINITION_QUERY, err);
        let definition = DatabaseDefinition::new(
            found.try_get::<String, _>("name").map_err(decode)?,
            found
                .try_get::<Option<String>, _>("character_set")
                .map_err(decode)?,
            found
                .try_get::<Option<String>, _>("collation_name")
                .map_err(decode)?,
        )
        .map_err(|err| DriverError::query(DEFINITION_QUERY, err))?;
        Ok(Some(definition))
    }

    async fn create_database(
        &self,
        instance: &Instance,
        definition: &DatabaseDefinition,
    ) -> DriverResult<()> {
        let mut statement = format!("CREATE DATABASE {}", quote_identifier(definition.name()));
        if let Some(charset) = definition.character_set() {
            statement.push_str(&format!(" CHARACTER SET {}", quote_identifier(charset)));
        }
        if let Some(collation) = definition.collation() {
            statement.push_str(&format!(" COLLATE {}", quote_identifier(collation)));
        }

        let mut connection = self.open(instance, None).await?;
        (&mut connection)
            .execute(sqlx::raw_sql(&statement))
            .await
            .map_err(|err| DriverError::query(&statement, err))?;
        Ok(())
    }

    async fn fetch_schema(&self, instance: &Instance) -> DriverResult<InstanceSchema> {
        let mut connection = self.open(instance, None).await?;
        introspect::fetch_schema(&mut connection).await
    }

    async fn dump_database(&self, instance: &Instance, database: &str) -> DriverResult<String> {
        let mut connection = self.open(instance, Some(database)).await?;
        dump::dump_database(&mut connection, database).await
    }
}

struct MySqlScriptConnection {
    connection: MySqlConnection,
}

#[async_trait]
impl ScriptConnection for MySqlScriptConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), StatementError> {
        (&mut self.connection)
            .execute(sqlx::raw_sql(statement))
            .await
            .map_err(|err| StatementError::new(err.to_string()))?;
        Ok(())
    }
}
