//! C5 — Sync Engine: the state machine that drives one sync cycle (§4.4).
//!
//! probe → drain → group → batch → transmit → process response → settle.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::dead_letter::DeadLetterStore;
use crate::queue::{SyncQueue, SyncQueueItem};
use crate::repository::TaskRepository;
use crate::task::Task;

use super::remote_client::RemoteClient;
use super::{BatchRequest, ItemStatus, SyncIntentWire, SyncResult};

pub struct SyncEngine {
    pool: SqlitePool,
    repository: TaskRepository,
    queue: SyncQueue,
    dead_letter: DeadLetterStore,
    remote: Arc<dyn RemoteClient>,
    batch_size: usize,
    max_retries: u32,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        remote: Arc<dyn RemoteClient>,
        batch_size: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            repository: TaskRepository::new(pool.clone()),
            queue: SyncQueue::new(pool.clone()),
            dead_letter: DeadLetterStore::new(pool.clone()),
            pool,
            remote,
            batch_size: batch_size.max(1),
            max_retries,
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn check_connectivity(&self) -> bool {
        self.remote.check_connectivity().await
    }

    /// Run one sync cycle. Never returns `Err` to the caller — every
    /// failure kind in §7 is reflected in the returned `SyncResult`
    /// instead (the one exception, a local store failure the engine
    /// cannot even record, is itself turned into a synthetic error entry).
    pub async fn run_cycle(&self) -> SyncResult {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("run_cycle called while a cycle is already in progress");
                return cycle_in_progress_result();
            }
        };

        match self.run_cycle_inner().await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "sync cycle aborted by a local store failure");
                store_failure_result(&err)
            }
        }
    }

    async fn run_cycle_inner(&self) -> Result<SyncResult> {
        // 1. Probe.
        if !self.remote.check_connectivity().await {
            info!("connectivity probe failed — deferring sync cycle");
            return Ok(connection_unreachable_result());
        }

        // 2. Drain.
        let items = self.queue.drain_chronological().await?;
        if items.is_empty() {
            return Ok(SyncResult {
                success: true,
                ..Default::default()
            });
        }

        // 3. Group (by task_id, preserving per-group created_at order).
        let groups = group_by_task(items);

        // 4. Batch.
        let batches = make_batches(groups, self.batch_size);

        let mut synced_items = 0u64;
        let mut failed_items = 0u64;
        let mut errors = Vec::new();

        for batch in batches {
            self.mark_batch_in_progress(&batch).await?;

            let wire_items: Vec<SyncIntentWire> = batch.iter().map(SyncIntentWire::from).collect();
            let checksum = super::compute_checksum(&wire_items);
            let request = BatchRequest {
                items: wire_items,
                client_timestamp: Utc::now(),
                checksum,
            };

            // 5. Transmit.
            match self.remote.post_batch(request).await {
                Ok(response) => {
                    if !response.checksum_verified {
                        warn!(
                            batch_len = batch.len(),
                            "checksum_verified=false for batch — processing anyway"
                        );
                    }

                    let by_client_id: HashMap<_, _> = response
                        .processed_items
                        .into_iter()
                        .map(|p| (p.client_id.clone(), p))
                        .collect();

                    // 6. Process response.
                    for item in &batch {
                        let Some(processed) = by_client_id.get(&item.id) else {
                            let message = "no response for item".to_string();
                            let outcome = self.handle_failure(item, &message).await?;
                            failed_items += 1;
                            errors.push(outcome);
                            continue;
                        };

                        match processed.status {
                            ItemStatus::Success => {
                                self.settle_success(item, processed.server_id.as_deref())
                                    .await?;
                                synced_items += 1;
                            }
                            ItemStatus::Conflict => {
                                let resolved = processed.resolved_data.clone().ok_or_else(|| {
                                    anyhow::anyhow!(
                                        "server reported a conflict with no resolved_data"
                                    )
                                })?;
                                self.resolve_conflict(item, resolved).await?;
                                synced_items += 1;
                            }
                            ItemStatus::Error => {
                                let message = processed
                                    .error
                                    .clone()
                                    .unwrap_or_else(|| "unspecified server error".to_string());
                                let outcome = self.handle_failure(item, &message).await?;
                                failed_items += 1;
                                errors.push(outcome);
                            }
                        }
                    }
                }
                Err(err) => {
                    // 7. Transport failure — the whole batch runs through
                    // the failure handler; the cycle continues.
                    warn!(error = %err, batch_len = batch.len(), "batch transmission failed");
                    for item in &batch {
                        let outcome = self.handle_failure(item, &err.to_string()).await?;
                        failed_items += 1;
                        errors.push(outcome);
                    }
                }
            }
        }

        // 8. Summarize.
        Ok(SyncResult {
            success: errors.is_empty(),
            synced_items,
            failed_items,
            errors,
        })
    }

    async fn mark_batch_in_progress(&self, batch: &[SyncQueueItem]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for item in batch {
            if seen.insert(item.task_id.clone()) {
                self.repository.mark_in_progress(&item.task_id).await?;
            }
        }
        Ok(())
    }

    async fn settle_success(&self, item: &SyncQueueItem, server_id: Option<&str>) -> Result<()> {
        self.repository.mark_synced(&item.task_id, server_id).await?;
        self.queue.remove_for_task(&item.task_id).await?;
        Ok(())
    }

    /// §4.5 — compare `updated_at`: local strictly newer wins, server
    /// strictly newer wins, equal ties go to the server. Whole-entity
    /// resolution, no field merging.
    async fn resolve_conflict(
        &self,
        item: &SyncQueueItem,
        server_snapshot: serde_json::Value,
    ) -> Result<()> {
        let server_task: Task = serde_json::from_value(server_snapshot)?;
        let local_task = self.repository.get_any(&item.task_id).await?;

        let winner = match local_task {
            Some(local) if local.updated_at > server_task.updated_at => local,
            _ => server_task,
        };

        self.repository.overwrite_with_snapshot(&winner).await?;
        self.queue.remove_for_task(&item.task_id).await?;
        Ok(())
    }

    /// §4.6 — bump retry and keep in the queue, or dead-letter atomically.
    async fn handle_failure(
        &self,
        item: &SyncQueueItem,
        message: &str,
    ) -> Result<super::SyncError> {
        if item.retry_count + 1 < self.max_retries {
            let new_count = item.retry_count + 1;
            self.queue.bump_retry(&item.id, new_count, message).await?;
            self.repository.mark_error(&item.task_id).await?;
        } else {
            let mut tx = self.pool.begin().await?;
            DeadLetterStore::insert_in_tx(&mut tx, item, message).await?;
            SyncQueue::remove_in_tx(&mut tx, &item.id).await?;
            tx.commit().await?;
            self.repository.mark_failed(&item.task_id).await?;
        }
        Ok(super::SyncError {
            task_id: item.task_id.clone(),
            message: message.to_string(),
        })
    }

    pub async fn count_pending(&self) -> Result<u64> {
        self.queue.count_pending().await
    }

    pub async fn last_synced_at(&self, task_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .repository
            .get_any(task_id)
            .await?
            .and_then(|t| t.last_synced_at))
    }

    pub async fn dead_letter_contents(&self) -> Result<Vec<crate::dead_letter::DeadLetterRecord>> {
        self.dead_letter.list_newest_first().await
    }
}

/// Partition items by `task_id`, preserving per-group `created_at` order
/// and using first-seen task order for the group sequence itself (§4.4
/// step 3).
fn group_by_task(items: Vec<SyncQueueItem>) -> Vec<Vec<SyncQueueItem>> {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<SyncQueueItem>> = HashMap::new();
    for item in items {
        groups
            .entry(item.task_id.clone())
            .or_insert_with(|| {
                order.push(item.task_id.clone());
                Vec::new()
            })
            .push(item);
    }
    order
        .into_iter()
        .map(|task_id| groups.remove(&task_id).unwrap_or_default())
        .collect()
}

/// Walk groups in order, appending members to the current batch and
/// starting a new one once `batch_size` is reached. Per-group order is
/// preserved; a group may be split across a batch boundary (§4.4 step 4,
/// scenario 6).
fn make_batches(groups: Vec<Vec<SyncQueueItem>>, batch_size: usize) -> Vec<Vec<SyncQueueItem>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    for group in groups {
        for item in group {
            current.push(item);
            if current.len() == batch_size {
                batches.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn connection_unreachable_result() -> SyncResult {
    SyncResult {
        success: false,
        synced_items: 0,
        failed_items: 0,
        errors: vec![super::SyncError {
            task_id: "connection".to_string(),
            message: "unable to reach the sync server".to_string(),
        }],
    }
}

fn cycle_in_progress_result() -> SyncResult {
    SyncResult {
        success: false,
        synced_items: 0,
        failed_items: 0,
        errors: vec![super::SyncError {
            task_id: "sync_engine".to_string(),
            message: crate::error::SyncEngineError::CycleInProgress.to_string(),
        }],
    }
}

fn store_failure_result(err: &anyhow::Error) -> SyncResult {
    SyncResult {
        success: false,
        synced_items: 0,
        failed_items: 0,
        errors: vec![super::SyncError {
            task_id: "sync_service".to_string(),
            message: err.to_string(),
        }],
    }
}
