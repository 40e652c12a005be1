//! C3 — Sync Queue: a durable, append-only log of sync intents.
//!
//! The queue is a passive log; it never schedules work itself (§4.2).
//! Insertion happens inside the same transaction as the task mutation that
//! caused it — see `repository::TaskRepository` — so `enqueue` here takes
//! an executor generic enough to be either the pool or an open
//! transaction.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::task::TaskSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => anyhow::bail!("unrecognized sync operation: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncQueueItem {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    pub data: TaskSnapshot,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct QueueRow {
    id: String,
    task_id: String,
    operation: String,
    data: String,
    created_at: String,
    retry_count: i64,
    error_message: Option<String>,
}

impl TryFrom<QueueRow> for SyncQueueItem {
    type Error = anyhow::Error;

    fn try_from(row: QueueRow) -> Result<Self> {
        Ok(SyncQueueItem {
            id: row.id,
            task_id: row.task_id,
            operation: Operation::parse(&row.operation)?,
            data: serde_json::from_str(&row.data)?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
            retry_count: row.retry_count as u32,
            error_message: row.error_message,
        })
    }
}

pub struct SyncQueue {
    pool: SqlitePool,
}

impl SyncQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new item with `retry_count = 0`, inside an already-open
    /// transaction (see I2: mutation + intent in one commit).
    pub async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        task_id: &str,
        operation: Operation,
        data: &TaskSnapshot,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let data_json = serde_json::to_string(data)?;
        sqlx::query(
            "INSERT INTO sync_queue (id, task_id, operation, data, created_at, retry_count, error_message) \
             VALUES (?, ?, ?, ?, ?, 0, NULL)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(operation.as_str())
        .bind(&data_json)
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    /// All items ordered first by `task_id`, then by `created_at` ascending
    /// (§4.2) — this is what makes per-task order preservation (P3) cheap to
    /// guarantee when grouping for batches.
    pub async fn drain_chronological(&self) -> Result<Vec<SyncQueueItem>> {
        let rows: Vec<QueueRow> =
            sqlx::query_as("SELECT * FROM sync_queue ORDER BY task_id ASC, created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(SyncQueueItem::try_from).collect()
    }

    pub async fn bump_retry(
        &self,
        item_id: &str,
        new_count: u32,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET retry_count = ?, error_message = ? WHERE id = ?")
            .bind(new_count as i64)
            .bind(error_message)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every queue item for a task (used on `success`/`conflict`
    /// settlement — I6: `synced` implies no queue item remains).
    pub async fn remove_for_task(&self, task_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_pending(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<SyncQueueItem>> {
        let row: Option<QueueRow> = sqlx::query_as("SELECT * FROM sync_queue WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SyncQueueItem::try_from).transpose()
    }

    /// Remove a queue item from inside an already-open transaction — used
    /// by the dead-letter move (I5: insert-then-remove is atomic).
    pub async fn remove_in_tx(tx: &mut Transaction<'_, Sqlite>, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(item_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
