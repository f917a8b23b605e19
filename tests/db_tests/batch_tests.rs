//! Chained Batch Tests
//!
//! Tests verify:
//! - Operations apply atomically in append order
//! - Validation happens at append time
//! - clear() and close() discard pending operations
//! - A batch is spent after write() or close()
//! - Batches are bound to the open they were created in

use emberkv::{
    Config, Db, DbOptions, EmberError, OpenOptions, Value, ValueEncoding, WalSyncStrategy,
    WriteOptions,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup_temp_db(value_encoding: ValueEncoding) -> (TempDir, Db) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let options = DbOptions::builder()
        .value_encoding(value_encoding)
        .engine(
            Config::builder()
                .wal_sync_strategy(WalSyncStrategy::EveryWrite)
                .build(),
        )
        .build();
    let db = Db::new(temp_dir.path(), options).unwrap();
    db.open(OpenOptions::default()).await.unwrap();
    (temp_dir, db)
}

// =============================================================================
// Write Tests
// =============================================================================

#[tokio::test]
async fn test_put_del_put_leaves_last_value() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("k", "v1").unwrap().del("k").unwrap().put("k", "v2").unwrap();
    assert_eq!(batch.len(), 3);
    batch.write().await.unwrap();

    assert_eq!(db.get("k").await.unwrap(), Value::from("v2"));
}

#[tokio::test]
async fn test_nothing_visible_before_write() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();
    batch.put("b", "2").unwrap();

    assert!(db.get("a").await.unwrap_err().is_not_found());

    batch
        .write_with_options(WriteOptions { sync: true })
        .await
        .unwrap();

    assert_eq!(db.get("a").await.unwrap(), Value::from("1"));
    assert_eq!(db.get("b").await.unwrap(), Value::from("2"));
}

#[tokio::test]
async fn test_values_are_encoded() {
    let (_temp, db) = setup_temp_db(ValueEncoding::Json).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("doc", json!({"id": 7})).unwrap();
    batch.write().await.unwrap();

    assert_eq!(db.get("doc").await.unwrap(), Value::from(json!({"id": 7})));
}

#[tokio::test]
async fn test_empty_batch_write() {
    let (_temp, db) = setup_temp_db(ValueEncoding::Buffer).await;

    let mut batch = db.chained_batch().unwrap();
    assert!(batch.is_empty());
    batch.write().await.unwrap();
}

// =============================================================================
// Validation Tests
// =============================================================================

#[tokio::test]
async fn test_invalid_key_rejected_at_append() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();

    assert!(matches!(batch.put("", "x"), Err(EmberError::InvalidKey(_))));
    assert!(matches!(batch.del(""), Err(EmberError::InvalidKey(_))));
    // The failed appends were not recorded
    assert_eq!(batch.len(), 1);

    batch.write().await.unwrap();
    assert_eq!(db.get("a").await.unwrap(), Value::from("1"));
}

// =============================================================================
// Clear / Close Tests
// =============================================================================

#[tokio::test]
async fn test_clear_discards_pending() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap().clear().unwrap().put("b", "2").unwrap();
    assert_eq!(batch.len(), 1);
    batch.write().await.unwrap();

    assert!(db.get("a").await.unwrap_err().is_not_found());
    assert_eq!(db.get("b").await.unwrap(), Value::from("2"));
}

#[tokio::test]
async fn test_close_discards_pending() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();
    batch.close();
    batch.close();

    assert!(batch.is_empty());
    assert!(db.get("a").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_batch_is_spent_after_write() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();
    batch.write().await.unwrap();

    assert!(matches!(batch.write().await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(batch.put("b", "2"), Err(EmberError::Lifecycle(_))));
    assert!(matches!(batch.del("a"), Err(EmberError::Lifecycle(_))));
    assert!(matches!(batch.clear(), Err(EmberError::Lifecycle(_))));
}

#[tokio::test]
async fn test_batch_is_spent_after_close() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.close();

    assert!(matches!(batch.write().await, Err(EmberError::Lifecycle(_))));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_batch_requires_open_db() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();
    db.close().await.unwrap();

    assert!(matches!(batch.put("b", "2"), Err(EmberError::Lifecycle(_))));
    assert!(matches!(batch.write().await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.chained_batch(), Err(EmberError::Lifecycle(_))));
}

#[tokio::test]
async fn test_batch_from_previous_open_cannot_write() {
    let (_temp, db) = setup_temp_db(ValueEncoding::String).await;

    let mut batch = db.chained_batch().unwrap();
    batch.put("a", "1").unwrap();
    db.close().await.unwrap();
    db.open(OpenOptions::default()).await.unwrap();

    assert!(matches!(batch.write().await, Err(EmberError::Lifecycle(_))));
    assert!(db.get("a").await.unwrap_err().is_not_found());
}
