//! C2 — Task Repository: durable CRUD over task rows with soft-delete and
//! sync-status bookkeeping. Every mutation records a sync intent in the
//! same transaction (I2) — see `queue::SyncQueue::enqueue_in_tx`.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::RepositoryError;
use crate::queue::Operation;
use crate::queue::SyncQueue;
use crate::task::{NewTask, SyncStatus, Task, TaskPatch, TaskRow};

pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Allocate a fresh id, write the row, and enqueue a `create` intent —
    /// atomically (I1, I2).
    pub async fn create(&self, new_task: NewTask) -> Result<Task> {
        if new_task.title.trim().is_empty() {
            return Err(RepositoryError::EmptyTitle.into());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO tasks \
             (id, title, description, completed, created_at, updated_at, is_deleted, sync_status, server_id, last_synced_at) \
             VALUES (?, ?, ?, 0, ?, ?, 0, 'pending', NULL, NULL)",
        )
        .bind(&id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;

        let task = Task {
            id: id.clone(),
            title: new_task.title,
            description: new_task.description,
            completed: false,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            server_id: None,
            last_synced_at: None,
        };

        SyncQueue::enqueue_in_tx(&mut tx, &id, Operation::Create, &task.to_snapshot()).await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Returns `None` if the task is missing or already soft-deleted. The
    /// `id` field is immutable even if present in `patch` (it isn't — the
    /// type doesn't carry one).
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = Task::try_from(row)?;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();
        task.sync_status = SyncStatus::Pending;

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, completed = ?, updated_at = ?, sync_status = 'pending' \
             WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.completed as i64)
        .bind(task.updated_at.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        SyncQueue::enqueue_in_tx(&mut tx, id, Operation::Update, &task.to_snapshot()).await?;
        tx.commit().await?;
        Ok(Some(task))
    }

    /// Returns `false` if the task is missing or already soft-deleted.
    /// Carries the final task snapshot in the `delete` intent.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut task = Task::try_from(row)?;
        task.is_deleted = true;
        task.updated_at = Utc::now();
        task.sync_status = SyncStatus::Pending;

        sqlx::query(
            "UPDATE tasks SET is_deleted = 1, updated_at = ?, sync_status = 'pending' WHERE id = ?",
        )
        .bind(task.updated_at.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        SyncQueue::enqueue_in_tx(&mut tx, id, Operation::Delete, &task.to_snapshot()).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Hides soft-deleted rows.
    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Task::try_from).transpose()
    }

    /// Fetches a task regardless of its soft-delete state. Used by conflict
    /// resolution, which must compare against a task that may itself be a
    /// pending delete (§4.5).
    pub async fn get_any(&self, id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    /// Hides soft-deleted rows.
    pub async fn list_all(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE is_deleted = 0 ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    /// Every live row with `sync_status ∈ {pending, error}`, ordered by
    /// `updated_at` ascending. Soft-deleted rows remain visible here even
    /// though they're hidden from `get`/`list_all` — a pending delete still
    /// needs to sync.
    pub async fn list_needing_sync(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE sync_status IN ('pending', 'error') ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    /// Sets `sync_status = synced`, `last_synced_at = now`, and optionally
    /// `server_id`. Called by the sync engine on a `success`/resolved
    /// `conflict` outcome (§4.4 step 6).
    pub async fn mark_synced(&self, id: &str, server_id: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        if let Some(server_id) = server_id {
            sqlx::query(
                "UPDATE tasks SET sync_status = 'synced', last_synced_at = ?, server_id = ? WHERE id = ?",
            )
            .bind(&now)
            .bind(server_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE tasks SET sync_status = 'synced', last_synced_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Replace the local row with the winning snapshot from conflict
    /// resolution, then mark it synced (§4.5 — whole-entity, no field
    /// merging).
    pub async fn overwrite_with_snapshot(&self, winning: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, completed = ?, updated_at = ?, \
             is_deleted = ?, sync_status = 'synced', server_id = COALESCE(?, server_id), \
             last_synced_at = ? WHERE id = ?",
        )
        .bind(&winning.title)
        .bind(&winning.description)
        .bind(winning.completed as i64)
        .bind(winning.updated_at.to_rfc3339())
        .bind(winning.is_deleted as i64)
        .bind(&winning.server_id)
        .bind(Utc::now().to_rfc3339())
        .bind(&winning.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_in_progress(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET sync_status = 'in-progress' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_error(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET sync_status = 'error' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET sync_status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
