//! Pipeline repository tests against `PostgreSQL`.

use std::time::Duration;

use crate::postgres::helpers::{
    FixedClock, TestCluster, TestDatabase, block_on, sample_instance, shared_test_cluster,
};
use eyre::{Result, ensure, eyre};
use rstest::rstest;
use schemaflow::instance::domain::{Database, DatabaseDefinition, Instance};
use schemaflow::pipeline::adapters::postgres::PostgresPipelineRepository;
use schemaflow::pipeline::domain::{
    IssueRef, MigrationEngine, MigrationRecord, MigrationType, NewMigrationHistory, Pipeline,
    PipelineSpec, SchemaUpdatePayload, StageSpec, Task, TaskPayload, TaskResult, TaskSpec,
    TaskStatus, TaskType,
};
use schemaflow::pipeline::ports::{PipelineRepository, PipelineRepositoryError};

struct Fixture {
    repository: PostgresPipelineRepository,
    clock: FixedClock,
    instance: Instance,
    shop: Database,
    _database: TestDatabase,
}

impl Fixture {
    fn create(cluster: &'static TestCluster, label: &str) -> Result<Self> {
        let database = TestDatabase::create(cluster, label)?;
        let repository = PostgresPipelineRepository::new(database.pool()?);
        let instance = sample_instance("primary")?;
        let shop = Database::new(instance.id(), DatabaseDefinition::new("shop", None, None)?);
        Ok(Self {
            repository,
            clock: FixedClock::pinned(),
            instance,
            shop,
            _database: database,
        })
    }

    fn update(&self, version: &str) -> TaskSpec {
        TaskSpec {
            name: format!("apply {version}"),
            instance_id: self.instance.id(),
            database_id: Some(self.shop.id()),
            payload: TaskPayload::DatabaseSchemaUpdate(SchemaUpdatePayload {
                statement: "ALTER TABLE orders ADD COLUMN note TEXT;".to_owned(),
                rollback_statement: Some("ALTER TABLE orders DROP COLUMN note;".to_owned()),
                version: version.to_owned(),
                description: String::new(),
                migration_type: MigrationType::Migrate,
            }),
        }
    }

    fn pipeline(&self, issue: Option<&str>, tasks: Vec<TaskSpec>) -> Result<Pipeline> {
        let spec = PipelineSpec {
            name: "rollout".to_owned(),
            issue: issue.map(IssueRef::new).transpose()?,
            stages: vec![StageSpec {
                name: "Prod".to_owned(),
                environment: self.instance.environment().clone(),
                tasks,
            }],
        };
        Ok(Pipeline::new(spec, &self.clock)?)
    }

    fn history_for(&self, task: &Task, version: &str) -> NewMigrationHistory {
        NewMigrationHistory {
            task_id: task.id(),
            instance_id: self.instance.id(),
            issue: None,
            record: MigrationRecord {
                database_name: self.shop.name().to_owned(),
                engine: MigrationEngine::Bytebase,
                migration_type: MigrationType::Migrate,
                version: version.to_owned(),
                description: String::new(),
                statement: "ALTER TABLE orders ADD COLUMN note TEXT;\n".to_owned(),
                execution_duration: Duration::from_millis(12),
                payload: serde_json::json!({
                    "rollbackStatement": "ALTER TABLE orders DROP COLUMN note;"
                }),
            },
            created_at: self.clock.now(),
        }
    }

    fn finished(&self, pipeline: &Pipeline, index: usize) -> Result<Task> {
        let mut task = pipeline
            .tasks()
            .nth(index)
            .cloned()
            .ok_or_else(|| eyre!("task {index} missing"))?;
        task.start(&self.clock)?;
        task.complete(TaskResult::detail("applied"), &self.clock)?;
        Ok(task)
    }
}

#[rstest]
fn stored_pipeline_round_trips(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let fixture = Fixture::create(shared_test_cluster, "stored_pipeline_round")?;
    block_on(async {
        let pipeline = fixture.pipeline(Some("ISSUE-7"), vec![fixture.update("v1")])?;
        fixture.repository.store(&pipeline).await?;

        let loaded = fixture
            .repository
            .find_pipeline(pipeline.id())
            .await?
            .ok_or_else(|| eyre!("pipeline missing"))?;
        assert_eq!(loaded, pipeline);

        let by_issue = fixture
            .repository
            .list_pipelines_by_issue(&IssueRef::new("ISSUE-7")?)
            .await?;
        let ids: Vec<_> = by_issue.iter().map(Pipeline::id).collect();
        assert_eq!(ids, vec![pipeline.id()]);

        let duplicate = fixture.repository.store(&pipeline).await;
        ensure!(
            matches!(
                duplicate,
                Err(PipelineRepositoryError::DuplicatePipeline(id)) if id == pipeline.id()
            ),
            "expected duplicate pipeline, got {duplicate:?}"
        );
        Ok(())
    })
}

#[rstest]
fn status_updates_move_tasks_between_queues(
    shared_test_cluster: &'static TestCluster,
) -> Result<()> {
    let fixture = Fixture::create(shared_test_cluster, "status_updates_move_ta")?;
    block_on(async {
        let pipeline = fixture.pipeline(None, vec![fixture.update("v1")])?;
        fixture.repository.store(&pipeline).await?;
        assert_eq!(fixture.repository.list_active().await?.len(), 1);

        let mut task = pipeline
            .tasks()
            .next()
            .cloned()
            .ok_or_else(|| eyre!("task missing"))?;
        task.start(&fixture.clock)?;
        fixture.repository.update_task(&task).await?;

        let running = fixture
            .repository
            .list_tasks_by_status(TaskStatus::Running)
            .await?;
        assert_eq!(running, vec![task.clone()]);

        let latest = fixture
            .repository
            .latest_task_for_database(fixture.shop.id(), TaskType::DatabaseSchemaUpdate)
            .await?;
        assert_eq!(latest.map(|found| found.id()), Some(task.id()));
        let no_backup = fixture
            .repository
            .latest_task_for_database(fixture.shop.id(), TaskType::DatabaseBackup)
            .await?;
        assert!(no_backup.is_none());

        task.complete(TaskResult::detail("applied"), &fixture.clock)?;
        fixture.repository.record_outcome(&task, None).await?;
        assert!(fixture.repository.list_active().await?.is_empty());
        Ok(())
    })
}

#[rstest]
fn updating_unknown_task_is_rejected(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let fixture = Fixture::create(shared_test_cluster, "updating_unknown_task")?;
    block_on(async {
        let pipeline = fixture.pipeline(None, vec![fixture.update("v1")])?;
        let task = fixture.finished(&pipeline, 0)?;

        let result = fixture.repository.update_task(&task).await;
        ensure!(
            matches!(result, Err(PipelineRepositoryError::TaskNotFound(id)) if id == task.id()),
            "expected task not found, got {result:?}"
        );
        Ok(())
    })
}

#[rstest]
fn history_sequences_are_contiguous_per_database(
    shared_test_cluster: &'static TestCluster,
) -> Result<()> {
    let fixture = Fixture::create(shared_test_cluster, "history_sequences_are")?;
    block_on(async {
        let pipeline = fixture.pipeline(None, vec![fixture.update("v1"), fixture.update("v2")])?;
        fixture.repository.store(&pipeline).await?;

        for (index, version) in ["v1", "v2"].into_iter().enumerate() {
            let task = fixture.finished(&pipeline, index)?;
            let entry = fixture
                .repository
                .record_outcome(&task, Some(fixture.history_for(&task, version)))
                .await?
                .ok_or_else(|| eyre!("no history entry for {version}"))?;
            assert_eq!(entry.sequence, u64::try_from(index)? + 1);
        }

        let history = fixture
            .repository
            .list_migration_history(fixture.instance.id(), fixture.shop.name())
            .await?;
        let versions: Vec<&str> = history.iter().map(|entry| entry.version.as_str()).collect();
        assert_eq!(versions, vec!["v1", "v2"]);
        let [first, _] = history.as_slice() else {
            return Err(eyre!("expected two entries"));
        };
        assert_eq!(first.execution_duration_ms, 12);
        assert_eq!(first.engine, MigrationEngine::Bytebase);

        let stored = fixture
            .repository
            .find_task(first.task_id)
            .await?
            .ok_or_else(|| eyre!("task missing"))?;
        assert_eq!(stored.status(), TaskStatus::Done);
        Ok(())
    })
}

#[rstest]
fn second_history_entry_for_a_task_is_rejected(
    shared_test_cluster: &'static TestCluster,
) -> Result<()> {
    let fixture = Fixture::create(shared_test_cluster, "second_history_entry_f")?;
    block_on(async {
        let pipeline = fixture.pipeline(None, vec![fixture.update("v1")])?;
        fixture.repository.store(&pipeline).await?;
        let task = fixture.finished(&pipeline, 0)?;
        fixture
            .repository
            .record_outcome(&task, Some(fixture.history_for(&task, "v1")))
            .await?;

        let again = fixture
            .repository
            .record_outcome(&task, Some(fixture.history_for(&task, "v1")))
            .await;
        ensure!(
            matches!(again, Err(PipelineRepositoryError::DuplicateHistory(id)) if id == task.id()),
            "expected duplicate history, got {again:?}"
        );
        let history = fixture
            .repository
            .list_migration_history(fixture.instance.id(), fixture.shop.name())
            .await?;
        assert_eq!(history.len(), 1);
        Ok(())
    })
}
