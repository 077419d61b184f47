//! `PostgreSQL` activity sink.

use super::{models::ActivityRow, schema::activities};
use crate::pg::{PgPool, run_blocking};
use crate::pipeline::{
    domain::{
        Activity, ActivityContainer, ActivityLevel, ActivityType, IssueRef, PipelineId, TaskId,
    },
    ports::{ActivitySink, ActivitySinkError},
};
use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

/// `PostgreSQL`-backed append-only activity ledger.
#[derive(Debug, Clone)]
pub struct PostgresActivitySink {
    pool: PgPool,
}

impl PostgresActivitySink {
    /// Creates a sink from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the activities filed under a container, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ActivitySinkError::Persistence`] when the query fails or a
    /// stored row cannot be decoded.
    pub async fn list_for_container(
        &self,
        container: &ActivityContainer,
    ) -> Result<Vec<Activity>, ActivitySinkError> {
        let kind = container.kind();
        let id = container.id_string();
        run_blocking(
            &self.pool,
            ActivitySinkError::persistence,
            ActivitySinkError::persistence,
            move |connection| {
                activities::table
                    .filter(activities::container_type.eq(kind))
                    .filter(activities::container_id.eq(id))
                    .order(activities::created_at.asc())
                    .select(ActivityRow::as_select())
                    .load(connection)
                    .map_err(ActivitySinkError::persistence)?
                    .into_iter()
                    .map(row_to_activity)
                    .collect()
            },
        )
        .await
    }
}

#[async_trait]
impl ActivitySink for PostgresActivitySink {
    async fn record(&self, activity: &Activity) -> Result<(), ActivitySinkError> {
        let row = ActivityRow {
            id: activity.id(),
            container_type: activity.container().kind().to_owned(),
            container_id: activity.container().id_string(),
            activity_type: activity.activity_type().as_str().to_owned(),
            level: activity.level().as_str().to_owned(),
            comment: activity.comment().to_owned(),
            payload: activity.payload().clone(),
            created_at: activity.created_at(),
        };
        run_blocking(
            &self.pool,
            ActivitySinkError::persistence,
            ActivitySinkError::persistence,
            move |connection| {
                diesel::insert_into(activities::table)
                    .values(&row)
                    .execute(connection)
                    .map_err(ActivitySinkError::persistence)?;
                Ok(())
            },
        )
        .await
    }
}

fn row_to_activity(row: ActivityRow) -> Result<Activity, ActivitySinkError> {
    let container = match row.container_type.as_str() {
        "issue" => ActivityContainer::Issue(
            IssueRef::new(row.container_id).map_err(ActivitySinkError::persistence)?,
        ),
        "pipeline" => ActivityContainer::Pipeline(PipelineId::from_uuid(
            parse_uuid(&row.container_id)?,
        )),
        "task" => ActivityContainer::Task(TaskId::from_uuid(parse_uuid(&row.container_id)?)),
        other => {
            return Err(ActivitySinkError::persistence(std::io::Error::other(format!(
                "unknown activity container type: {other}"
            ))));
        }
    };
    Ok(Activity::from_persisted(
        row.id,
        container,
        ActivityType::try_from(row.activity_type.as_str())
            .map_err(ActivitySinkError::persistence)?,
        ActivityLevel::try_from(row.level.as_str()).map_err(ActivitySinkError::persistence)?,
        row.comment,
        row.payload,
        row.created_at,
    ))
}

fn parse_uuid(value: &str) -> Result<Uuid, ActivitySinkError> {
    Uuid::parse_str(value).map_err(ActivitySinkError::persistence)
}
