//! C1 — Store Adapter: the transactional key/row store the rest of the
//! crate is built on. A thin wrapper over `sqlx::SqlitePool`; schema is
//! applied with idempotent `CREATE TABLE IF NOT EXISTS` statements so
//! opening an existing database is a no-op past the first run.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::warn;

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the SQLite database under `data_dir`, apply schema,
    /// and reset any `in-progress` task left dangling by a prior crash back
    /// to `pending` (Design Note §9.2 — an in-progress marker that survives
    /// a crash is not meaningful, and no cycle will ever drain it as-is).
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("tasksync.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        let store = Self { pool };
        store.reset_dangling_in_progress().await?;
        Ok(store)
    }

    /// In-memory database, for tests that don't need to survive a restart.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in [include_str!("migrations/001_init.sql")] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    async fn reset_dangling_in_progress(&self) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET sync_status = 'pending' WHERE sync_status = 'in-progress'",
        )
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            warn!(
                count = result.rows_affected(),
                "reset dangling in-progress tasks to pending on startup"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn startup_resets_dangling_in_progress_tasks() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Store::migrate(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO tasks (id, title, created_at, updated_at, sync_status) \
             VALUES ('t1', 'Title', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 'in-progress')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = Store { pool };
        store.reset_dangling_in_progress().await.unwrap();

        let (status,): (String,) = sqlx::query_as("SELECT sync_status FROM tasks WHERE id = 't1'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(status, "pending");
    }
}
