use async_trait::async_trait;
use chrono::SubsecRound;
use sqlx::{sqlite::SqliteRow, Row};

use entops_core::domain::deal::{DealId, OrgId};
use entops_core::domain::task::{NewTask, Task, TaskId, TaskStatus};
use entops_core::errors::StoreError;
use entops_core::store::TaskStore;

use super::{decode_enum, encode_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn prepare(task: NewTask) -> Task {
    let mut task = task.into_task();
    task.created_at = task.created_at.trunc_subsecs(6);
    task
}

#[async_trait]
impl TaskStore for SqlTaskRepository {
    async fn list_for_step(
        &self,
        deal_id: &DealId,
        pipeline_step: u8,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, org_id, deal_id, title, description, status, pipeline_step, created_at
             FROM tasks
             WHERE deal_id = ? AND pipeline_step = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&deal_id.0)
        .bind(i64::from(pipeline_step))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, org_id, deal_id, title, description, status, pipeline_step, created_at
             FROM tasks
             WHERE deal_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&deal_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = prepare(task);
        sqlx::query(
            "INSERT INTO tasks (id, org_id, deal_id, title, description, status, pipeline_step, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id.0)
        .bind(&task.org_id.0)
        .bind(&task.deal_id.0)
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.status.as_str())
        .bind(i64::from(task.pipeline_step))
        .bind(encode_timestamp(task.created_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(task)
    }

    /// Single `INSERT ... SELECT ... WHERE NOT EXISTS` so the open-task check and the insert
    /// cannot interleave with another writer.
    async fn create_if_no_open_match(
        &self,
        deal_id: &DealId,
        marker: &str,
        task: NewTask,
    ) -> Result<Option<Task>, StoreError> {
        let task = prepare(task);
        let result = sqlx::query(
            "INSERT INTO tasks (id, org_id, deal_id, title, description, status, pipeline_step, created_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                SELECT 1 FROM tasks
                WHERE deal_id = ?
                  AND status NOT IN ('DONE', 'CANCELED')
                  AND instr(title, ?) > 0
             )",
        )
        .bind(&task.id.0)
        .bind(&task.org_id.0)
        .bind(&task.deal_id.0)
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.status.as_str())
        .bind(i64::from(task.pipeline_step))
        .bind(encode_timestamp(task.created_at))
        .bind(&deal_id.0)
        .bind(marker)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok((result.rows_affected() == 1).then_some(task))
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {}", id.0)));
        }
        Ok(())
    }
}

fn task_from_row(row: SqliteRow) -> Result<Task, RepositoryError> {
    let step = row.try_get::<i64, _>("pipeline_step")?;
    let pipeline_step = u8::try_from(step).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `pipeline_step`: {step}"))
    })?;

    Ok(Task {
        id: TaskId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        deal_id: DealId(row.try_get("deal_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: decode_enum("status", row.try_get("status")?, TaskStatus::parse)?,
        pipeline_step,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
