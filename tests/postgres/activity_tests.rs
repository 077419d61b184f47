//! Activity ledger tests against `PostgreSQL`.

use crate::postgres::helpers::{
    FixedClock, TestCluster, TestDatabase, block_on, shared_test_cluster,
};
use eyre::Result;
use rstest::rstest;
use schemaflow::pipeline::adapters::postgres::PostgresActivitySink;
use schemaflow::pipeline::domain::{
    Activity, ActivityContainer, ActivityLevel, ActivityType, IssueRef, TaskId, TaskStatus,
    TaskStatusUpdatePayload,
};
use schemaflow::pipeline::ports::ActivitySink;

#[rstest]
fn activities_are_listed_per_container(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "activities_are_listed")?;
    block_on(async {
        let sink = PostgresActivitySink::new(database.pool()?);
        let clock = FixedClock::pinned();
        let issue = ActivityContainer::Issue(IssueRef::new("ISSUE-7")?);
        let payload = TaskStatusUpdatePayload {
            task_id: TaskId::new(),
            old_status: TaskStatus::Running,
            new_status: TaskStatus::Failed,
            issue_name: Some("ISSUE-7".to_owned()),
            task_name: "apply v1".to_owned(),
        };
        let failed = Activity::new(
            issue.clone(),
            ActivityType::TaskStatusUpdate,
            ActivityLevel::for_status(TaskStatus::Failed),
            "task failed",
            serde_json::to_value(&payload)?,
            clock.now(),
        );
        let elsewhere = Activity::new(
            ActivityContainer::Task(payload.task_id),
            ActivityType::TaskCancel,
            ActivityLevel::Info,
            "cancel requested",
            serde_json::Value::Null,
            clock.now(),
        );
        sink.record(&failed).await?;
        sink.record(&elsewhere).await?;

        let listed = sink.list_for_container(&issue).await?;
        assert_eq!(listed, vec![failed]);
        Ok(())
    })
}
