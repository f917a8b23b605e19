//! # emberkv
//!
//! An embedded, ordered key-value store with:
//! - Pluggable key/value encodings (`Buffer`, `String`, `Json`)
//! - Bidirectional range iterators with a prefetch page cache
//! - Reference-counted point-in-time snapshots
//! - Atomic array and chained batches
//! - Read streams over any range
//! - A bundled WAL-backed LSM engine behind a narrow engine contract
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Db (async client contract)                  │
//! │   DbIterator · ChainedBatch · Snapshot · ReadStream · Codec  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  spawn_blocking
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │            Backend / Engine traits (backend.rs)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 LsmEngine (single writer)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (CoW Arc)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use emberkv::{Db, DbOptions, OpenOptions, RangeOptions};
//!
//! # async fn demo() -> emberkv::Result<()> {
//! let db = Db::new("/tmp/emberkv-demo", DbOptions::default())?;
//! db.open(OpenOptions::default()).await?;
//!
//! db.put("a", "1").await?;
//! db.put("b", "2").await?;
//!
//! let mut it = db.iterator(RangeOptions::new().gte("a"))?;
//! while let Some(entry) = it.next().await? {
//!     println!("{:?}", entry);
//! }
//! it.end().await?;
//!
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod codec;
pub mod range;
pub mod backend;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EmberError, Result};
pub use config::{
    Config, ConfigBuilder, DbOptions, DbOptionsBuilder, OpenOptions, ReadOptions,
    WalSyncStrategy, WriteOptions,
};
pub use codec::{check_key, JsonDecode, Key, KeyEncoding, Value, ValueEncoding};
pub use range::RangeOptions;
pub use backend::{Backend, Engine};
pub use engine::LsmBackend;
pub use db::{
    BatchOp, ChainedBatch, Db, DbIterator, Entry, ReadStream, Snapshot, Status, StreamItem,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
