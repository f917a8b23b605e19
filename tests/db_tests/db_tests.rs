//! Store Handle Tests
//!
//! Tests verify:
//! - Lifecycle transitions and their guards
//! - Point reads and writes under every value encoding
//! - Miss normalization to `NotFound`
//! - Array batches: validation before any write, ordered application
//! - Maintenance: sizes, compaction, properties, destroy, repair
//! - Pluggable backends behind the same handle

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use emberkv::backend::{EngineBatch, EngineCursor, EngineSnapshot, RawOp};
use emberkv::range::ScanRange;
use emberkv::{
    Backend, BatchOp, Config, Db, DbOptions, EmberError, Engine, Key, KeyEncoding, OpenOptions,
    ReadOptions, Status, Value, ValueEncoding, WalSyncStrategy, WriteOptions,
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

fn test_options(value_encoding: ValueEncoding) -> DbOptions {
    DbOptions::builder()
        .value_encoding(value_encoding)
        .engine(
            Config::builder()
                .wal_sync_strategy(WalSyncStrategy::EveryWrite)
                .build(),
        )
        .build()
}

async fn open_db(path: &Path, value_encoding: ValueEncoding) -> Db {
    init_tracing();
    let db = Db::new(path, test_options(value_encoding)).unwrap();
    db.open(OpenOptions::default()).await.unwrap();
    db
}

async fn setup_temp_db() -> (TempDir, Db) {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(temp_dir.path(), ValueEncoding::Buffer).await;
    (temp_dir, db)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_status_transitions() {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path(), DbOptions::default()).unwrap();
    assert_eq!(db.status(), Status::New);

    db.open(OpenOptions::default()).await.unwrap();
    assert_eq!(db.status(), Status::Open);

    db.close().await.unwrap();
    assert_eq!(db.status(), Status::Closed);

    // A closed handle may be reopened
    db.open(OpenOptions::default()).await.unwrap();
    assert_eq!(db.status(), Status::Open);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_guards() {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path(), DbOptions::default()).unwrap();

    assert!(matches!(db.close().await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.get("k").await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.put("k", "v").await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.iterator(Default::default()), Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.snapshot(), Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.get_property("emberkv.stats"), Err(EmberError::Lifecycle(_))));

    db.open(OpenOptions::default()).await.unwrap();
    assert!(matches!(
        db.open(OpenOptions::default()).await,
        Err(EmberError::Lifecycle(_))
    ));

    db.close().await.unwrap();
    assert!(matches!(db.close().await, Err(EmberError::Lifecycle(_))));
    assert!(matches!(db.delete("k").await, Err(EmberError::Lifecycle(_))));
}

#[tokio::test]
async fn test_failed_open_reverts_status() {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path().join("missing"), DbOptions::default()).unwrap();

    let result = db
        .open(OpenOptions {
            create_if_missing: false,
            error_if_exists: false,
        })
        .await;

    assert!(matches!(result, Err(EmberError::Storage(_))));
    assert_eq!(db.status(), Status::New);

    // The handle is still usable
    db.open(OpenOptions::default()).await.unwrap();
    assert_eq!(db.status(), Status::Open);
}

#[tokio::test]
async fn test_error_if_exists() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(temp_dir.path(), ValueEncoding::Buffer).await;
    db.close().await.unwrap();

    let result = db
        .open(OpenOptions {
            create_if_missing: true,
            error_if_exists: true,
        })
        .await;

    assert!(matches!(result, Err(EmberError::Storage(_))));
    assert_eq!(db.status(), Status::Closed);
}

#[test]
fn test_empty_location_rejected() {
    let result = Db::new("", DbOptions::default());
    assert!(matches!(result, Err(EmberError::Config(_))));
}

#[tokio::test]
async fn test_clones_share_lifecycle() {
    let (_temp, db) = setup_temp_db().await;
    let other = db.clone();

    other.put("k", "v").await.unwrap();
    assert_eq!(db.get("k").await.unwrap(), Value::from(&b"v"[..]));

    db.close().await.unwrap();
    assert_eq!(other.status(), Status::Closed);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = open_db(temp_dir.path(), ValueEncoding::String).await;
        db.put("persist", "me").await.unwrap();
        db.close().await.unwrap();
    }

    let db = open_db(temp_dir.path(), ValueEncoding::String).await;
    assert_eq!(db.get("persist").await.unwrap(), Value::from("me"));
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[tokio::test]
async fn test_put_get_every_encoding() {
    let temp_dir = TempDir::new().unwrap();

    let buffer = open_db(&temp_dir.path().join("buffer"), ValueEncoding::Buffer).await;
    buffer.put("k", &b"\x00\xff"[..]).await.unwrap();
    assert_eq!(buffer.get("k").await.unwrap(), Value::from(&b"\x00\xff"[..]));

    let string = open_db(&temp_dir.path().join("string"), ValueEncoding::String).await;
    string.put("k", "héllo").await.unwrap();
    assert_eq!(string.get("k").await.unwrap(), Value::from("héllo"));

    let json = open_db(&temp_dir.path().join("json"), ValueEncoding::Json).await;
    json.put("k", json!({"n": 1, "tags": ["a"]})).await.unwrap();
    assert_eq!(
        json.get("k").await.unwrap(),
        Value::from(json!({"n": 1, "tags": ["a"]}))
    );
}

#[tokio::test]
async fn test_get_as_string() {
    let (_temp, db) = setup_temp_db().await;
    db.put("k", "text").await.unwrap();

    let value = db
        .get_with_options("k", ReadOptions { as_buffer: false })
        .await
        .unwrap();

    assert_eq!(value, Value::from("text"));
}

#[tokio::test]
async fn test_missing_key_is_not_found() {
    let temp_dir = TempDir::new().unwrap();

    for (name, encoding) in [
        ("buffer", ValueEncoding::Buffer),
        ("string", ValueEncoding::String),
        ("json", ValueEncoding::Json),
    ] {
        let db = open_db(&temp_dir.path().join(name), encoding).await;

        let err = db.get("never").await.unwrap_err();
        assert!(err.is_not_found());

        db.put("gone", Value::json(&1).unwrap()).await.unwrap();
        db.delete("gone").await.unwrap();
        assert!(db.get("gone").await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn test_delete_every_key() {
    let (_temp, db) = setup_temp_db().await;
    let keys: Vec<String> = (0..20).map(|i| format!("key{}", i)).collect();

    for key in &keys {
        db.put(key, "v").await.unwrap();
    }
    for key in &keys {
        db.delete(key).await.unwrap();
        assert!(matches!(db.get(key).await, Err(EmberError::NotFound)));
    }
}

#[tokio::test]
async fn test_delete_missing_key_succeeds() {
    let (_temp, db) = setup_temp_db().await;
    db.delete("never").await.unwrap();
}

#[tokio::test]
async fn test_empty_keys_rejected() {
    let (_temp, db) = setup_temp_db().await;

    assert!(matches!(db.put("", "v").await, Err(EmberError::InvalidKey(_))));
    assert!(matches!(db.get("").await, Err(EmberError::InvalidKey(_))));
    assert!(matches!(
        db.delete(Vec::<u8>::new()).await,
        Err(EmberError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_null_value_stored_as_empty() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(temp_dir.path(), ValueEncoding::Json).await;

    db.put("k", Value::null()).await.unwrap();

    assert_eq!(db.get("k").await.unwrap(), Value::null());
}

#[tokio::test]
async fn test_numeric_keys() {
    let (_temp, db) = setup_temp_db().await;

    db.put(42u64, "answer").await.unwrap();

    assert_eq!(db.get("42").await.unwrap(), Value::from(&b"answer"[..]));
}

#[tokio::test]
async fn test_sync_write() {
    let (_temp, db) = setup_temp_db().await;

    db.put_with_options("k", "v", WriteOptions { sync: true })
        .await
        .unwrap();
    db.delete_with_options("k", WriteOptions { sync: true })
        .await
        .unwrap();

    assert!(db.get("k").await.unwrap_err().is_not_found());
}

// =============================================================================
// Array Batch Tests
// =============================================================================

#[tokio::test]
async fn test_batch_applies_in_order() {
    let (_temp, db) = setup_temp_db().await;
    db.put("old", "x").await.unwrap();

    db.batch(vec![
        BatchOp::put("a", "1"),
        BatchOp::put("b", "2"),
        BatchOp::del("a"),
        BatchOp::put("a", "3"),
        BatchOp::del("old"),
    ])
    .await
    .unwrap();

    assert_eq!(db.get("a").await.unwrap(), Value::from(&b"3"[..]));
    assert_eq!(db.get("b").await.unwrap(), Value::from(&b"2"[..]));
    assert!(db.get("old").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_batch_with_invalid_key_writes_nothing() {
    let (_temp, db) = setup_temp_db().await;
    db.put("existing", "before").await.unwrap();

    let result = db
        .batch(vec![
            BatchOp::put("a", "1"),
            BatchOp::del("existing"),
            BatchOp::put("", "bad"),
            BatchOp::put("d", "4"),
            BatchOp::put("e", "5"),
        ])
        .await;

    assert!(matches!(result, Err(EmberError::InvalidKey(_))));
    for key in ["a", "d", "e"] {
        assert!(db.get(key).await.unwrap_err().is_not_found());
    }
    assert_eq!(db.get("existing").await.unwrap(), Value::from(&b"before"[..]));
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let (_temp, db) = setup_temp_db().await;
    db.batch(Vec::new()).await.unwrap();
}

// =============================================================================
// Maintenance Tests
// =============================================================================

#[tokio::test]
async fn test_approximate_size_and_compact_range() {
    let (_temp, db) = setup_temp_db().await;
    for i in 0..100 {
        db.put(format!("key{:03}", i), "a value of some size").await.unwrap();
    }
    db.compact_range("key000", "key999").await.unwrap();

    let size = db.approximate_size("key000", "key999").await.unwrap();
    assert!(size > 0);
    assert_eq!(db.approximate_size("key999", "key000").await.unwrap(), 0);
    assert_eq!(
        db.get_property("emberkv.num-files").unwrap().as_deref(),
        Some("1")
    );
}

#[tokio::test]
async fn test_maintenance_argument_checks() {
    let (_temp, db) = setup_temp_db().await;

    assert!(matches!(
        db.approximate_size("", "z").await,
        Err(EmberError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.compact_range("a", "").await,
        Err(EmberError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.get_property(""),
        Err(EmberError::InvalidArgument(_))
    ));
    assert_eq!(db.get_property("emberkv.nope").unwrap(), None);
}

#[tokio::test]
async fn test_destroy_and_repair() {
    let temp_dir = TempDir::new().unwrap();
    let location = temp_dir.path().join("db");
    {
        let db = open_db(&location, ValueEncoding::Buffer).await;
        db.put("k", "v").await.unwrap();
        db.close().await.unwrap();
    }

    Db::repair(&location).await.unwrap();
    {
        let db = open_db(&location, ValueEncoding::Buffer).await;
        assert_eq!(db.get("k").await.unwrap(), Value::from(&b"v"[..]));
        db.close().await.unwrap();
    }

    Db::destroy(&location).await.unwrap();
    assert!(!location.exists());

    // Both succeed on a missing location
    Db::destroy(&location).await.unwrap();
    Db::repair(&location).await.unwrap();

    assert!(matches!(Db::destroy("").await, Err(EmberError::Config(_))));
}

#[tokio::test]
async fn test_second_handle_is_locked_out() {
    let temp_dir = TempDir::new().unwrap();
    let first = open_db(temp_dir.path(), ValueEncoding::String).await;
    first.put("k", "first").await.unwrap();

    let second = Db::new(temp_dir.path(), test_options(ValueEncoding::String)).unwrap();
    let result = second.open(OpenOptions::default()).await;
    assert!(matches!(result, Err(EmberError::Locked(_))));
    assert_eq!(second.status(), Status::New);

    // Maintenance is refused while the store is open
    assert!(matches!(
        Db::destroy(temp_dir.path()).await,
        Err(EmberError::Locked(_))
    ));
    assert!(matches!(
        Db::repair(temp_dir.path()).await,
        Err(EmberError::Locked(_))
    ));

    // The first handle is unaffected
    first.put("j", "first").await.unwrap();
    assert_eq!(first.get("k").await.unwrap(), Value::from("first"));

    first.close().await.unwrap();
    second.open(OpenOptions::default()).await.unwrap();
    assert_eq!(second.get("k").await.unwrap(), Value::from("first"));
    assert_eq!(second.get("j").await.unwrap(), Value::from("first"));
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_encodings_reported() {
    let temp_dir = TempDir::new().unwrap();
    let options = DbOptions::builder()
        .key_encoding(KeyEncoding::String)
        .value_encoding(ValueEncoding::Json)
        .build();

    let db = Db::new(temp_dir.path(), options).unwrap();

    assert_eq!(db.key_encoding(), KeyEncoding::String);
    assert_eq!(db.value_encoding(), ValueEncoding::Json);
    assert_eq!(db.location(), temp_dir.path());
}

// =============================================================================
// Custom Backend Tests
// =============================================================================

/// Reports every miss as an error instead of `Ok(None)`
struct MissEngine;

impl Engine for MissEngine {
    fn close(&self) -> emberkv::Result<()> {
        Ok(())
    }

    fn get(&self, _key: &[u8]) -> emberkv::Result<Option<Bytes>> {
        Err(EmberError::NotFound)
    }

    fn put(&self, _key: Bytes, _value: Bytes, _options: &WriteOptions) -> emberkv::Result<()> {
        Err(EmberError::Storage("read-only".to_string()))
    }

    fn delete(&self, _key: Bytes, _options: &WriteOptions) -> emberkv::Result<()> {
        Err(EmberError::Storage("read-only".to_string()))
    }

    fn batch_apply(&self, _ops: Vec<RawOp>, _options: &WriteOptions) -> emberkv::Result<()> {
        Err(EmberError::Storage("read-only".to_string()))
    }

    fn iter_new(&self, _range: &ScanRange) -> emberkv::Result<Box<dyn EngineCursor>> {
        Err(EmberError::Storage("unsupported".to_string()))
    }

    fn snapshot_new(&self) -> emberkv::Result<Arc<dyn EngineSnapshot>> {
        Err(EmberError::Storage("unsupported".to_string()))
    }

    fn batch_new(&self) -> emberkv::Result<Box<dyn EngineBatch>> {
        Err(EmberError::Storage("unsupported".to_string()))
    }

    fn approximate_size(&self, _start: &[u8], _end: &[u8]) -> emberkv::Result<u64> {
        Ok(0)
    }

    fn compact_range(&self, _start: &[u8], _end: &[u8]) -> emberkv::Result<()> {
        Ok(())
    }

    fn property(&self, name: &str) -> Option<String> {
        (name == "miss.kind").then(|| "test".to_string())
    }
}

struct MissBackend;

impl Backend for MissBackend {
    fn open(&self, _location: &Path, _options: &OpenOptions) -> emberkv::Result<Arc<dyn Engine>> {
        Ok(Arc::new(MissEngine))
    }

    fn destroy(&self, _location: &Path) -> emberkv::Result<()> {
        Ok(())
    }

    fn repair(&self, _location: &Path) -> emberkv::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_backend() {
    let db = Db::with_backend("memory", DbOptions::default(), Arc::new(MissBackend)).unwrap();
    db.open(OpenOptions::default()).await.unwrap();

    // Engine-reported misses are normalized like any other
    assert!(matches!(db.get(Key::from("k")).await, Err(EmberError::NotFound)));
    assert!(matches!(db.put("k", "v").await, Err(EmberError::Storage(_))));
    assert_eq!(db.get_property("miss.kind").unwrap().as_deref(), Some("test"));

    db.close().await.unwrap();
    Db::destroy_with("memory", Arc::new(MissBackend)).await.unwrap();
}
