//! Scripted in-memory driver.
//!
//! Each instance gets an [`InstanceBehaviour`] describing how it answers:
//! whether it is reachable, which schema it reports, which statements fail,
//! and how long statements take. Executed statements are recorded so tests
//! can inspect ordering and concurrency.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::instance::{
    domain::{DatabaseDefinition, Instance, InstanceId, InstanceSchema},
    ports::{DriverError, DriverResult, InstanceDriver},
};
use crate::script::{ScriptConnection, StatementError};

/// How a scripted instance responds.
#[derive(Debug, Clone, Default)]
pub struct InstanceBehaviour {
    /// Refuse every connection.
    pub unreachable: bool,
    /// Snapshot returned by schema fetches.
    pub schema: InstanceSchema,
    /// Dump text returned for any database.
    pub dump: Option<String>,
    /// Statements containing this text fail.
    pub failing_statement: Option<String>,
    /// Time each statement takes.
    pub statement_delay: Option<Duration>,
    /// Time each schema fetch takes.
    pub fetch_delay: Option<Duration>,
}

/// Statement recorded by a scripted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    /// Instance the statement ran on.
    pub instance_id: InstanceId,
    /// Database the connection was scoped to.
    pub database: Option<String>,
    /// Statement text.
    pub statement: String,
}

type ConnectionScope = (InstanceId, Option<String>);

#[derive(Debug, Default)]
struct DriverState {
    behaviours: HashMap<InstanceId, InstanceBehaviour>,
    databases: HashMap<InstanceId, Vec<DatabaseDefinition>>,
    executed: Vec<ExecutedStatement>,
    in_flight: HashMap<ConnectionScope, usize>,
    peak_in_flight: HashMap<ConnectionScope, usize>,
}

/// Thread-safe scripted driver.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriver {
    state: Arc<Mutex<DriverState>>,
}

impl InMemoryDriver {
    /// Creates a driver where every instance is reachable and empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how an instance responds.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the state lock is poisoned.
    pub fn set_behaviour(
        &self,
        instance_id: InstanceId,
        behaviour: InstanceBehaviour,
    ) -> DriverResult<()> {
        lock(&self.state)?.behaviours.insert(instance_id, behaviour);
        Ok(())
    }

    /// Declares a database that already exists on an instance.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the state lock is poisoned.
    pub fn add_database(
        &self,
        instance_id: InstanceId,
        definition: DatabaseDefinition,
    ) -> DriverResult<()> {
        lock(&self.state)?
            .databases
            .entry(instance_id)
            .or_default()
            .push(definition);
        Ok(())
    }

    /// Returns every executed statement in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the state lock is poisoned.
    pub fn executed_statements(&self) -> DriverResult<Vec<ExecutedStatement>> {
        Ok(lock(&self.state)?.executed.clone())
    }

    /// Returns the highest number of statements seen running at once on
    /// one database.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the state lock is poisoned.
    pub fn peak_concurrency(&self, instance_id: InstanceId, database: &str) -> DriverResult<usize> {
        let scope = (instance_id, Some(database.to_owned()));
        Ok(lock(&self.state)?
            .peak_in_flight
            .get(&scope)
            .copied()
            .unwrap_or(0))
    }

    fn behaviour(&self, instance_id: InstanceId) -> DriverResult<InstanceBehaviour> {
        let behaviour = lock(&self.state)?
            .behaviours
            .get(&instance_id)
            .cloned()
            .unwrap_or_default();
        if behaviour.unreachable {
            return Err(DriverError::connection(std::io::Error::other(format!(
                "instance {instance_id} is unreachable"
            ))));
        }
        Ok(behaviour)
    }
}

fn lock(state: &Mutex<DriverState>) -> DriverResult<MutexGuard<'_, DriverState>> {
    state
        .lock()
        .map_err(|err| DriverError::connection(std::io::Error::other(err.to_string())))
}

#[async_trait]
impl InstanceDriver for InMemoryDriver {
    async fn connect(
        &self,
        instance: &Instance,
        database: Option<&str>,
    ) -> DriverResult<Box<dyn ScriptConnection>> {
        let behaviour = self.behaviour(instance.id())?;
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            scope: (instance.id(), database.map(str::to_owned)),
            behaviour,
        }))
    }

    async fn database_definition(
        &self,
        instance: &Instance,
        name: &str,
    ) -> DriverResult<Option<DatabaseDefinition>> {
        self.behaviour(instance.id())?;
        Ok(lock(&self.state)?
            .databases
            .get(&instance.id())
            .and_then(|databases| databases.iter().find(|definition| definition.name() == name))
            .cloned())
    }

    async fn create_database(
        &self,
        instance: &Instance,
        definition: &DatabaseDefinition,
    ) -> DriverResult<()> {
        self.behaviour(instance.id())?;
        let mut state = lock(&self.state)?;
        state.executed.push(ExecutedStatement {
            instance_id: instance.id(),
            database: None,
            statement: format!("CREATE DATABASE `{}`;", definition.name()),
        });
        state
            .databases
            .entry(instance.id())
            .or_default()
            .push(definition.clone());
        Ok(())
    }

    async fn fetch_schema(&self, instance: &Instance) -> DriverResult<InstanceSchema> {
        let behaviour = self.behaviour(instance.id())?;
        if let Some(delay) = behaviour.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(behaviour.schema)
    }

    async fn dump_database(&self, instance: &Instance, database: &str) -> DriverResult<String> {
        let behaviour = self.behaviour(instance.id())?;
        Ok(behaviour.dump.unwrap_or_else(|| {
            format!("-- dump of {database}\nCREATE TABLE `t` (\n  `id` INT\n);\n")
        }))
    }
}

struct InMemoryConnection {
    state: Arc<Mutex<DriverState>>,
    scope: ConnectionScope,
    behaviour: InstanceBehaviour,
}

impl InMemoryConnection {
    fn enter(&self) -> Result<(), StatementError> {
        let mut state = self.lock()?;
        let running = state.in_flight.entry(self.scope.clone()).or_insert(0);
        *running += 1;
        let current = *running;
        let peak = state.peak_in_flight.entry(self.scope.clone()).or_insert(0);
        *peak = (*peak).max(current);
        Ok(())
    }

    fn leave(&self, statement: &str) -> Result<(), StatementError> {
        let mut state = self.lock()?;
        if let Some(running) = state.in_flight.get_mut(&self.scope) {
            *running = running.saturating_sub(1);
        }
        state.executed.push(ExecutedStatement {
            instance_id: self.scope.0,
            database: self.scope.1.clone(),
            statement: statement.to_owned(),
        });
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, DriverState>, StatementError> {
        self.state
            .lock()
            .map_err(|err| StatementError::new(err.to_string()))
    }
}

#[async_trait]
impl ScriptConnection for InMemoryConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), StatementError> {
        self.enter()?;
        if let Some(delay) = self.behaviour.statement_delay {
            tokio::time::sleep(delay).await;
        }
        self.leave(statement)?;

        match &self.behaviour.failing_statement {
            Some(marker) if statement.contains(marker.as_str()) => {
                Err(StatementError::new(format!("statement rejected: {marker}")))
            }
            _ => Ok(()),
        }
    }
}
