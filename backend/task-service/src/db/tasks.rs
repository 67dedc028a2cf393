/// Task database operations
///
/// Writes carry their task events and insert them into the outbox on the
/// same transaction.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use transactional_outbox::{OutboxEvent, SqlxOutboxRepository};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Task;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task, events: &[OutboxEvent]) -> Result<()>;

    async fn find(&self, pid: Uuid) -> Result<Option<Task>>;

    async fn list(&self) -> Result<Vec<Task>>;

    async fn open_tasks(&self) -> Result<Vec<Task>>;

    /// Marks the task done if it is still open and assigned to `assignee`.
    async fn complete(&self, pid: Uuid, assignee: Uuid, event: &OutboxEvent) -> Result<bool>;

    /// New assignee per task, all in one transaction.
    async fn reassign(&self, assignments: &[(Uuid, Uuid)], events: &[OutboxEvent])
        -> Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    pid: Uuid,
    description: String,
    assignee: Uuid,
    fee: i32,
    award: i32,
    completed: bool,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            pid: row.pid,
            description: row.description,
            assignee: row.assignee,
            fee: row.fee,
            award: row.award,
            completed: row.completed,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

const TASK_COLUMNS: &str =
    "pid, description, assignee, fee, award, completed, created_at, completed_at";

#[derive(Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn enqueue(tx: &mut Transaction<'_, Postgres>, events: &[OutboxEvent]) -> Result<()> {
    for event in events {
        SqlxOutboxRepository::insert(tx, event).await?;
    }
    Ok(())
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create(&self, task: &Task, events: &[OutboxEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (pid, description, assignee, fee, award, completed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.pid)
        .bind(&task.description)
        .bind(task.assignee)
        .bind(task.fee)
        .bind(task.award)
        .bind(task.completed)
        .bind(task.created_at)
        .execute(&mut *tx)
        .await?;

        enqueue(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, pid: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE pid = $1"
        ))
        .bind(pid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Task::from))
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn open_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE NOT completed ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn complete(&self, pid: Uuid, assignee: Uuid, event: &OutboxEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET completed = TRUE, completed_at = NOW()
            WHERE pid = $1 AND assignee = $2 AND NOT completed
            "#,
        )
        .bind(pid)
        .bind(assignee)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        SqlxOutboxRepository::insert(&mut tx, event).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn reassign(
        &self,
        assignments: &[(Uuid, Uuid)],
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (pid, assignee) in assignments {
            sqlx::query("UPDATE tasks SET assignee = $2 WHERE pid = $1 AND NOT completed")
                .bind(pid)
                .bind(assignee)
                .execute(&mut *tx)
                .await?;
        }

        enqueue(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }
}
