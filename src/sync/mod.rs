//! Wire protocol types and checksum for the batched upload protocol (§6),
//! plus the sync engine (C5) and remote client (C6) that speak it.

pub mod engine;
pub mod remote_client;

use serde::{Deserialize, Serialize};

use crate::queue::{Operation, SyncQueueItem};
use crate::task::TaskSnapshot;

/// `SyncIntent` on the wire — `{id, task_id, operation, data, created_at,
/// retry_count}` (§6). Constructed from a `SyncQueueItem`, dropping the
/// locally-only `error_message` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncIntentWire {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    pub data: TaskSnapshot,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
}

impl From<&SyncQueueItem> for SyncIntentWire {
    fn from(item: &SyncQueueItem) -> Self {
        SyncIntentWire {
            id: item.id.clone(),
            task_id: item.task_id.clone(),
            operation: item.operation,
            data: item.data.clone(),
            created_at: item.created_at,
            retry_count: item.retry_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<SyncIntentWire>,
    pub client_timestamp: chrono::DateTime<chrono::Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Conflict,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub client_id: String,
    pub server_id: Option<String>,
    pub status: ItemStatus,
    pub resolved_data: Option<TaskSnapshot>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub processed_items: Vec<ProcessedItem>,
    pub server_timestamp: chrono::DateTime<chrono::Utc>,
    pub checksum_verified: bool,
}

/// One reported failure in a `SyncResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub task_id: String,
    pub message: String,
}

/// What `SyncEngine::run_cycle` returns. `success` is true iff `errors` is
/// empty (§4.4 step 8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub synced_items: u64,
    pub failed_items: u64,
    pub errors: Vec<SyncError>,
}

impl SyncResult {
    fn settle(self) -> Self {
        Self {
            success: self.errors.is_empty(),
            ..self
        }
    }
}

/// Concatenate `"<id>-<operation>-<task_id>"` with `|` separators, in
/// submission order, and take a hex MD5 (§6). A transport-integrity hint,
/// not a security primitive (§1 Non-goals).
pub fn compute_checksum(items: &[SyncIntentWire]) -> String {
    let joined = items
        .iter()
        .map(|item| format!("{}-{}-{}", item.id, item.operation.as_str(), item.task_id))
        .collect::<Vec<_>>()
        .join("|");
    format!("{:x}", md5::compute(joined.as_bytes()))
}
