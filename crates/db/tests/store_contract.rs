//! Behavioural contract shared by every `CheckpointStore` backend.
//!
//! The memory backend always runs. The Postgres backend runs the same
//! checks when a database is available (`cargo test -- --ignored` with
//! `DATABASE_URL` set).

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokenlift_core::checkpoint::{
    Checkpoint, CheckpointFilter, CheckpointStatus, CheckpointUpdate, ExtractedTokens,
    PROGRESS_EXTRACTION, PROGRESS_SCREENSHOT,
};
use tokenlift_db::{CheckpointStore, MemoryCheckpointStore, PgCheckpointStore, StoreError};

// ---------------------------------------------------------------------------
// Contract checks
// ---------------------------------------------------------------------------

async fn create_then_load_round_trips(store: &dyn CheckpointStore) {
    let checkpoint = Checkpoint::with_id("cp-round-trip", "https://example.com", Utc::now());
    store.create(&checkpoint).await.unwrap();

    let loaded = store.load("cp-round-trip").await.unwrap().expect("stored");
    assert_eq!(loaded.id, checkpoint.id);
    assert_eq!(loaded.url, checkpoint.url);
    assert_eq!(loaded.status, CheckpointStatus::Pending);
    assert_eq!(loaded.progress, 0);
    assert_eq!(loaded.started_at, checkpoint.started_at);
}

async fn duplicate_create_is_rejected(store: &dyn CheckpointStore) {
    let checkpoint = Checkpoint::with_id("cp-dup", "https://example.com", Utc::now());
    store.create(&checkpoint).await.unwrap();

    assert_matches!(
        store.create(&checkpoint).await,
        Err(StoreError::DuplicateKey(id)) if id == "cp-dup"
    );
}

async fn load_missing_is_none(store: &dyn CheckpointStore) {
    assert!(store.load("cp-missing").await.unwrap().is_none());
}

async fn update_missing_is_not_found(store: &dyn CheckpointStore) {
    let update = CheckpointUpdate::stage(CheckpointStatus::Screenshot, PROGRESS_SCREENSHOT);
    assert_matches!(
        store.update("cp-missing", &update).await,
        Err(StoreError::NotFound(id)) if id == "cp-missing"
    );
}

async fn update_merges_and_refreshes_timestamp(store: &dyn CheckpointStore) {
    let created = Utc::now() - Duration::seconds(30);
    let checkpoint = Checkpoint::with_id("cp-merge", "https://example.com", created);
    store.create(&checkpoint).await.unwrap();

    store
        .update(
            "cp-merge",
            &CheckpointUpdate {
                extracted_tokens: Some(ExtractedTokens::default()),
                ..CheckpointUpdate::stage(CheckpointStatus::Extraction, PROGRESS_EXTRACTION)
            },
        )
        .await
        .unwrap();
    let merged = store
        .update("cp-merge", &CheckpointUpdate::failed("boom"))
        .await
        .unwrap();

    assert_eq!(merged.status, CheckpointStatus::Failed);
    assert_eq!(merged.progress, PROGRESS_EXTRACTION);
    assert!(merged.extracted_tokens.is_some());
    assert_eq!(merged.error.as_deref(), Some("boom"));
    assert!(merged.updated_at > created);

    let reloaded = store.load("cp-merge").await.unwrap().unwrap();
    assert_eq!(reloaded, merged);
}

async fn list_filters_by_status_newest_first(store: &dyn CheckpointStore) {
    let base = Utc::now();
    for (i, id) in ["cp-list-a", "cp-list-b", "cp-list-c"].into_iter().enumerate() {
        let checkpoint =
            Checkpoint::with_id(id, "https://example.com", base + Duration::seconds(i as i64));
        store.create(&checkpoint).await.unwrap();
    }
    store
        .update("cp-list-b", &CheckpointUpdate::failed("nope"))
        .await
        .unwrap();

    let all = store.list(&CheckpointFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["cp-list-c", "cp-list-b", "cp-list-a"]);

    let failed = store
        .list(&CheckpointFilter {
            status: Some(CheckpointStatus::Failed),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, "cp-list-b");

    let limited = store
        .list(&CheckpointFilter {
            status: None,
            limit: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

async fn delete_reports_presence(store: &dyn CheckpointStore) {
    let checkpoint = Checkpoint::with_id("cp-delete", "https://example.com", Utc::now());
    store.create(&checkpoint).await.unwrap();

    assert!(store.delete("cp-delete").await.unwrap());
    assert!(!store.delete("cp-delete").await.unwrap());
    assert!(store.load("cp-delete").await.unwrap().is_none());
}

async fn run_contract(store: &dyn CheckpointStore) {
    create_then_load_round_trips(store).await;
    duplicate_create_is_rejected(store).await;
    load_missing_is_none(store).await;
    update_missing_is_not_found(store).await;
    update_merges_and_refreshes_timestamp(store).await;
    list_filters_by_status_newest_first(store).await;
    delete_reports_presence(store).await;
    store.health_check().await.unwrap();
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_store_honours_contract() {
    let store = MemoryCheckpointStore::new();
    run_contract(&store).await;
    assert_eq!(store.backend(), "memory");
}

#[tokio::test]
async fn memory_store_is_safe_across_ids() {
    let store = std::sync::Arc::new(MemoryCheckpointStore::new());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("cp-concurrent-{i}");
            let checkpoint = Checkpoint::with_id(&id, "https://example.com", Utc::now());
            store.create(&checkpoint).await.unwrap();
            store
                .update(&id, &CheckpointUpdate::stage(CheckpointStatus::Screenshot, PROGRESS_SCREENSHOT))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(store.len().await, 16);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn postgres_store_honours_contract(pool: PgPool) {
    tokenlift_db::health_check(&pool).await.unwrap();
    let store = PgCheckpointStore::new(pool);
    run_contract(&store).await;
    assert_eq!(store.backend(), "postgres");
}
