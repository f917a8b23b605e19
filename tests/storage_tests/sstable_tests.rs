//! Tests for SSTable implementation
//!
//! These tests verify:
//! - SSTable creation and metadata
//! - Point lookups via the in-memory index
//! - Tombstone handling
//! - Bounded range scans in both directions
//! - Size estimation
//! - File format validation and checksum verification

use std::fs;
use std::ops::Bound;
use std::path::PathBuf;

use bytes::Bytes;
use emberkv::memtable::Record;
use emberkv::storage::{SSTableBuilder, SSTableReader, TableSummary};
use emberkv::EmberError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_sstable() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sst");
    (temp_dir, path)
}

/// Create an SSTable with numbered entries
fn create_sstable_with_entries(path: &PathBuf, count: usize) -> TableSummary {
    let mut builder = SSTableBuilder::new(path).unwrap();
    for i in 0..count {
        let key = format!("key{:05}", i); // Zero-padded for lexicographic order
        let value = format!("value{}", i);
        builder.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    builder.finish().unwrap()
}

fn keys(entries: &[(Bytes, Record)]) -> Vec<String> {
    entries
        .iter()
        .map(|(k, _)| String::from_utf8(k.to_vec()).unwrap())
        .collect()
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_metadata() {
    let (_temp, path) = setup_temp_sstable();

    let sstable = create_sstable_with_entries(&path, 5);

    assert!(path.exists());
    assert_eq!(sstable.entry_count(), 5);
    assert_eq!(sstable.min_key, b"key00000".to_vec());
    assert_eq!(sstable.max_key, b"key00004".to_vec());
    assert_eq!(sstable.file_size, fs::metadata(&path).unwrap().len());
    assert!(sstable.might_contain(b"key00002"));
    assert!(!sstable.might_contain(b"zzz"));
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_sstable();
    let mut builder = SSTableBuilder::new(&path).unwrap();

    builder.add(b"b", b"1").unwrap();
    let result = builder.add(b"a", b"2");

    assert!(matches!(result, Err(EmberError::Storage(_))));
}

#[test]
fn test_empty_table_opens() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 0);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.min_key(), None);
    assert!(!reader.might_contain(b"anything"));
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_point_lookups() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 100);

    let reader = SSTableReader::open(&path).unwrap();

    assert_eq!(reader.entry_count(), 100);
    assert_eq!(
        reader.get(b"key00042").unwrap(),
        Some(Record::Value(Bytes::from_static(b"value42")))
    );
    assert_eq!(reader.get(b"key99999").unwrap(), None);
}

#[test]
fn test_reader_tombstones() {
    let (_temp, path) = setup_temp_sstable();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.add_tombstone(b"b").unwrap();
    builder.add(b"c", b"").unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();

    assert_eq!(reader.get(b"b").unwrap(), Some(Record::Tombstone));
    assert_eq!(reader.get(b"c").unwrap(), Some(Record::Value(Bytes::new())));
}

#[test]
fn test_reader_iter_all() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();
    let entries: Vec<(Bytes, Record)> = reader.iter().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(keys(&entries)[0], "key00000");
    assert_eq!(keys(&entries)[9], "key00009");
}

// =============================================================================
// Range Scan Tests
// =============================================================================

#[test]
fn test_scan_forward_bounded() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 20);
    let reader = SSTableReader::open(&path).unwrap();

    let entries = reader
        .scan(
            Bound::Excluded(&b"key00003"[..]),
            Bound::Included(&b"key00007"[..]),
            false,
            100,
        )
        .unwrap();

    assert_eq!(
        keys(&entries),
        vec!["key00004", "key00005", "key00006", "key00007"]
    );
}

#[test]
fn test_scan_reverse_with_count() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 20);
    let reader = SSTableReader::open(&path).unwrap();

    let entries = reader
        .scan(Bound::Unbounded, Bound::Excluded(&b"key00010"[..]), true, 3)
        .unwrap();

    assert_eq!(keys(&entries), vec!["key00009", "key00008", "key00007"]);
}

#[test]
fn test_scan_inverted_bounds_is_empty() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 5);
    let reader = SSTableReader::open(&path).unwrap();

    let entries = reader
        .scan(Bound::Included(&b"key00004"[..]), Bound::Excluded(&b"key00001"[..]), false, 10)
        .unwrap();
    assert!(entries.is_empty());

    let entries = reader
        .scan(Bound::Excluded(&b"key00002"[..]), Bound::Excluded(&b"key00002"[..]), false, 10)
        .unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_approximate_size() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 100);
    let reader = SSTableReader::open(&path).unwrap();

    let all = reader.approximate_size(b"a", b"z");
    let half = reader.approximate_size(b"key00000", b"key00050");

    assert!(all > 0);
    assert!(half > 0 && half < all);
    assert_eq!(reader.approximate_size(b"x", b"y"), 0);
    assert_eq!(reader.approximate_size(b"z", b"a"), 0);
}

// =============================================================================
// Format Validation Tests
// =============================================================================

#[test]
fn test_open_rejects_bad_magic() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 3);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(EmberError::Storage(_))
    ));
}

#[test]
fn test_open_rejects_tiny_file() {
    let (_temp, path) = setup_temp_sstable();
    fs::write(&path, b"EMKV").unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

#[test]
fn test_checksum_verification() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);
    SSTableReader::open_with(&path, true).unwrap();

    // Flip a byte inside the first value; lengths and index stay intact
    let mut bytes = fs::read(&path).unwrap();
    let first_value = 14 + 8 + "key00000".len();
    bytes[first_value] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(SSTableReader::open(&path).is_ok());
    assert!(matches!(
        SSTableReader::open_with(&path, true),
        Err(EmberError::Storage(_))
    ));
}
