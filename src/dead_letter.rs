//! C4 — Dead-Letter Quarantine: terminal destination for exhausted-retry
//! intents. Insert-only; nothing here is ever resurrected into the queue.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::queue::{Operation, SyncQueueItem};
use crate::task::TaskSnapshot;

#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    pub data: TaskSnapshot,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub final_error_message: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DeadLetterRow {
    id: String,
    task_id: String,
    operation: String,
    data: String,
    created_at: String,
    retry_count: i64,
    failed_at: String,
    final_error_message: String,
}

impl TryFrom<DeadLetterRow> for DeadLetterRecord {
    type Error = anyhow::Error;

    fn try_from(row: DeadLetterRow) -> Result<Self> {
        Ok(DeadLetterRecord {
            id: row.id,
            task_id: row.task_id,
            operation: Operation::parse(&row.operation)?,
            data: serde_json::from_str(&row.data)?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
            retry_count: row.retry_count as u32,
            failed_at: DateTime::parse_from_rfc3339(&row.failed_at)?.with_timezone(&Utc),
            final_error_message: row.final_error_message,
        })
    }
}

pub struct DeadLetterStore {
    pool: SqlitePool,
}

impl DeadLetterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the original queue item verbatim, plus `failed_at` and
    /// `final_error_message`, inside an already-open transaction — paired
    /// with `SyncQueue::remove_in_tx` by the caller for the atomic move
    /// required by I5.
    pub async fn insert_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        item: &SyncQueueItem,
        final_error_message: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let data_json = serde_json::to_string(&item.data)?;
        sqlx::query(
            "INSERT INTO dead_letter_queue \
             (id, task_id, operation, data, created_at, retry_count, failed_at, final_error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.task_id)
        .bind(item.operation.as_str())
        .bind(&data_json)
        .bind(item.created_at.to_rfc3339())
        .bind(item.retry_count as i64)
        .bind(&now)
        .bind(final_error_message)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Newest-first, for operator diagnostics (§4.3).
    pub async fn list_newest_first(&self) -> Result<Vec<DeadLetterRecord>> {
        let rows: Vec<DeadLetterRow> =
            sqlx::query_as("SELECT * FROM dead_letter_queue ORDER BY failed_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(DeadLetterRecord::try_from).collect()
    }
}
