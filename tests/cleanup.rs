//! Retention cleanup against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use flexibee_sync::testing::MemoryRecordStore;
use flexibee_sync::Cleaner;
use sync_core::{EntityCatalog, EntityDescriptor};

fn catalog() -> Arc<EntityCatalog> {
    Arc::new(
        EntityCatalog::new()
            .with(EntityDescriptor::new("orders", "orders", "id", false))
            .with(EntityDescriptor::new("invoices", "invoices", "id", false))
            .with(EntityDescriptor::new("partners", "partners", "id", true)),
    )
}

#[tokio::test]
async fn test_disabled_retention_deletes_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    store.insert_row("orders", 1, now - Duration::days(1000));
    let cleaner = Cleaner::new(store.clone(), catalog(), 0, 100);

    assert!(!cleaner.is_enabled());
    assert_eq!(cleaner.run_at(now).await.unwrap(), 0);
    assert_eq!(store.row_count("orders"), 1);
    assert_eq!(store.cleanup_rounds("orders"), 0);
}

#[tokio::test]
async fn test_cutoff_is_strict() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    let cleaner = Cleaner::new(store.clone(), catalog(), 30, 100);
    let cutoff = cleaner.cutoff(now).unwrap();
    assert_eq!(cutoff, now - Duration::days(30));

    store.insert_row("orders", 1, cutoff - Duration::seconds(1));
    store.insert_row("orders", 2, cutoff);
    store.insert_row("orders", 3, now);

    assert_eq!(cleaner.run_at(now).await.unwrap(), 1);
    assert!(store.row("orders", 1).is_none());
    assert!(store.row("orders", 2).is_some());
    assert!(store.row("orders", 3).is_some());

    let log = store.cleanup_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entity, "orders");
    assert_eq!(log[0].rows_deleted, 1);
    assert_eq!(log[0].oldest_kept, cutoff);
}

#[tokio::test]
async fn test_reference_data_is_never_cleaned() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    store.insert_row("partners", 1, now - Duration::days(1000));
    store.insert_row("orders", 1, now - Duration::days(1000));
    let cleaner = Cleaner::new(store.clone(), catalog(), 30, 100);

    assert_eq!(cleaner.run_at(now).await.unwrap(), 1);
    assert_eq!(store.row_count("partners"), 1);
    assert_eq!(store.cleanup_rounds("partners"), 0);
    assert_eq!(store.row_count("orders"), 0);
}

#[tokio::test]
async fn test_deletes_in_bounded_rounds() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    for id in 1..=5 {
        store.insert_row("orders", id, now - Duration::days(60));
    }
    for id in 1..=4 {
        store.insert_row("invoices", id, now - Duration::days(60));
    }
    let cleaner = Cleaner::new(store.clone(), catalog(), 30, 2);

    assert_eq!(cleaner.run_at(now).await.unwrap(), 9);
    // 2 + 2 + 1
    assert_eq!(store.cleanup_rounds("orders"), 3);
    // 2 + 2 + 0
    assert_eq!(store.cleanup_rounds("invoices"), 3);
    assert_eq!(store.row_count("orders"), 0);
    assert_eq!(store.row_count("invoices"), 0);
}

#[tokio::test]
async fn test_log_only_when_rows_deleted() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    store.insert_row("orders", 1, now - Duration::days(60));
    store.insert_row("invoices", 1, now);
    let cleaner = Cleaner::new(store.clone(), catalog(), 30, 100);

    cleaner.run_at(now).await.unwrap();
    cleaner.run_at(now).await.unwrap();

    let log = store.cleanup_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entity, "orders");
}

#[tokio::test]
async fn test_failure_does_not_stop_other_entities() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    store.insert_row("orders", 1, now - Duration::days(60));
    store.insert_row("invoices", 1, now - Duration::days(60));
    store.insert_row("invoices", 2, now - Duration::days(60));
    store.fail_cleanup("orders");
    let cleaner = Cleaner::new(store.clone(), catalog(), 30, 100);

    let err = cleaner.run_at(now).await.unwrap_err();

    assert_eq!(err.rows_deleted, 2);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].entity, "orders");
    assert!(err.to_string().contains("orders"));
    assert_eq!(store.row_count("orders"), 1);
    assert_eq!(store.row_count("invoices"), 0);
}

#[tokio::test]
async fn test_unrepresentable_cutoff_deletes_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let now = Utc::now();
    store.insert_row("orders", 1, now - Duration::days(1000));
    let cleaner = Cleaner::new(store.clone(), catalog(), u32::MAX, 100);

    assert!(cleaner.is_enabled());
    assert!(cleaner.cutoff(now).is_none());
    assert_eq!(cleaner.run_at(now).await.unwrap(), 0);
    assert_eq!(store.row_count("orders"), 1);
    assert_eq!(store.cleanup_rounds("orders"), 0);
    assert!(store.cleanup_log().is_empty());
}
