//! End-to-end scenarios driving the public API: task mutation through a
//! temp-dir SQLite store, sync cycles against a real HTTP mock server.

use std::sync::Arc;

use tasksync::queue::SyncQueue;
use tasksync::sync::{BatchResponse, ItemStatus, ProcessedItem};
use tasksync::{HttpRemoteClient, NewTask, Store, SyncEngine, TaskPatch, TaskRepository};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fresh_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn create_update_delete_cycle_ends_with_an_empty_queue() {
    let (_dir, store) = fresh_store().await;
    let repo = TaskRepository::new(store.pool());

    let task = repo
        .create(NewTask {
            title: "Write quarterly report".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    repo.update(
        &task.id,
        TaskPatch {
            completed: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    repo.delete(&task.id).await.unwrap();

    let queue = SyncQueue::new(store.pool());
    assert_eq!(queue.count_pending().await.unwrap(), 3);

    let server = MockServer::start().await;
    let items = queue.drain_chronological().await.unwrap();
    let wire: Vec<_> = items.iter().map(tasksync::sync::SyncIntentWire::from).collect();
    let response = BatchResponse {
        processed_items: wire
            .iter()
            .map(|i| ProcessedItem {
                client_id: i.id.clone(),
                server_id: Some(format!("srv-{}", i.id)),
                status: ItemStatus::Success,
                resolved_data: None,
                error: None,
            })
            .collect(),
        server_timestamp: chrono::Utc::now(),
        checksum_verified: true,
    };
    Mock::given(method("POST"))
        .and(path("/sync/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sync/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let remote = Arc::new(HttpRemoteClient::new(server.uri()));
    let engine = SyncEngine::new(store.pool(), remote, 10, 3);

    let result = engine.run_cycle().await;
    assert!(result.success);
    assert_eq!(result.synced_items, 3);
    assert_eq!(queue.count_pending().await.unwrap(), 0);

    // The task was soft-deleted, so it no longer shows up in list_all.
    assert!(repo.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn an_unreachable_server_leaves_the_queue_untouched() {
    let (_dir, store) = fresh_store().await;
    let repo = TaskRepository::new(store.pool());
    repo.create(NewTask {
        title: "Offline task".into(),
        description: String::new(),
    })
    .await
    .unwrap();

    let remote = Arc::new(HttpRemoteClient::new("http://127.0.0.1:1".to_string()));
    let engine = SyncEngine::new(store.pool(), remote, 10, 3);

    let result = engine.run_cycle().await;
    assert!(!result.success);
    assert_eq!(result.errors[0].task_id, "connection");

    let queue = SyncQueue::new(store.pool());
    assert_eq!(queue.count_pending().await.unwrap(), 1);
}

#[tokio::test]
async fn coming_back_online_syncs_what_accumulated_while_offline() {
    let (_dir, store) = fresh_store().await;
    let repo = TaskRepository::new(store.pool());
    repo.create(NewTask {
        title: "Queued while offline".into(),
        description: String::new(),
    })
    .await
    .unwrap();

    let offline_remote = Arc::new(HttpRemoteClient::new("http://127.0.0.1:1".to_string()));
    let offline_engine = SyncEngine::new(store.pool(), offline_remote, 10, 3);
    let offline_result = offline_engine.run_cycle().await;
    assert!(!offline_result.success);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync/batch"))
        .respond_with(echo_success_responder_with_real_ids(&store).await)
        .mount(&server)
        .await;

    let online_remote = Arc::new(HttpRemoteClient::new(server.uri()));
    let online_engine = SyncEngine::new(store.pool(), online_remote, 10, 3);
    let result = online_engine.run_cycle().await;
    assert!(result.success);
    assert_eq!(result.synced_items, 1);

    let queue = SyncQueue::new(store.pool());
    assert_eq!(queue.count_pending().await.unwrap(), 0);
}

async fn echo_success_responder_with_real_ids(store: &Store) -> ResponseTemplate {
    let queue = SyncQueue::new(store.pool());
    let items = queue.drain_chronological().await.unwrap();
    let response = BatchResponse {
        processed_items: items
            .iter()
            .map(|i| ProcessedItem {
                client_id: i.id.clone(),
                server_id: Some(format!("srv-{}", i.id)),
                status: ItemStatus::Success,
                resolved_data: None,
                error: None,
            })
            .collect(),
        server_timestamp: chrono::Utc::now(),
        checksum_verified: true,
    };
    ResponseTemplate::new(200).set_body_json(response)
}

#[tokio::test]
async fn batch_size_of_one_drains_two_tasks_over_two_cycles_worth_of_batches() {
    let (_dir, store) = fresh_store().await;
    let repo = TaskRepository::new(store.pool());
    repo.create(NewTask {
        title: "First".into(),
        description: String::new(),
    })
    .await
    .unwrap();
    repo.create(NewTask {
        title: "Second".into(),
        description: String::new(),
    })
    .await
    .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync/batch"))
        .respond_with(echo_success_responder_with_real_ids(&store).await)
        .mount(&server)
        .await;

    let remote = Arc::new(HttpRemoteClient::new(server.uri()));
    let engine = SyncEngine::new(store.pool(), remote, 1, 3);

    let result = engine.run_cycle().await;
    assert!(result.success);
    assert_eq!(result.synced_items, 2);
}
