//! The `Task` entity and its on-disk row projection.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `sync_status` lifecycle — see the state diagram in the sync engine module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Synced,
    Error,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unrecognized sync_status: {other}"),
        }
    }

    /// Tasks in this status are owed a queue item per invariant I1.
    pub fn needs_sync(&self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }
}

/// An owned user entity, as consumed by callers of the Task Repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub sync_status: SyncStatus,
    pub server_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Fields accepted by `TaskRepository::create`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Fields accepted by `TaskRepository::update`. `id` is never patchable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// Raw row shape as stored by `sqlx`. Booleans are 0/1, timestamps are
/// RFC3339 text, `server_id`/`last_synced_at` are nullable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: i64,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: i64,
    pub sync_status: String,
    pub server_id: Option<String>,
    pub last_synced_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            completed: row.completed != 0,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .context("parsing created_at")?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .context("parsing updated_at")?
                .with_timezone(&Utc),
            is_deleted: row.is_deleted != 0,
            sync_status: SyncStatus::parse(&row.sync_status)?,
            server_id: row.server_id,
            last_synced_at: row
                .last_synced_at
                .as_deref()
                .map(DateTime::parse_from_rfc3339)
                .transpose()
                .context("parsing last_synced_at")?
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

/// The full task snapshot carried in a sync intent's `data` payload and in
/// a server's `resolved_data`. Self-describing (JSON) per spec §3/§6.
pub type TaskSnapshot = serde_json::Value;

impl Task {
    pub fn to_snapshot(&self) -> TaskSnapshot {
        serde_json::to_value(self).expect("Task serializes infallibly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_roundtrips_through_its_string_form() {
        for s in [
            SyncStatus::Pending,
            SyncStatus::InProgress,
            SyncStatus::Synced,
            SyncStatus::Error,
            SyncStatus::Failed,
        ] {
            assert_eq!(SyncStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn needs_sync_is_true_only_for_pending_and_error() {
        assert!(SyncStatus::Pending.needs_sync());
        assert!(SyncStatus::Error.needs_sync());
        assert!(!SyncStatus::InProgress.needs_sync());
        assert!(!SyncStatus::Synced.needs_sync());
        assert!(!SyncStatus::Failed.needs_sync());
    }

    #[test]
    fn row_to_task_is_a_total_projection() {
        let row = TaskRow {
            id: "t1".into(),
            title: "Title".into(),
            description: "Desc".into(),
            completed: 1,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-02T00:00:00Z".into(),
            is_deleted: 0,
            sync_status: "pending".into(),
            server_id: None,
            last_synced_at: None,
        };
        let task = Task::try_from(row).unwrap();
        assert!(task.completed);
        assert!(!task.is_deleted);
        assert_eq!(task.sync_status, SyncStatus::Pending);
        assert!(task.server_id.is_none());
        assert!(task.last_synced_at.is_none());
    }
}
