//! Configuration for emberkv
//!
//! Centralized configuration with sensible defaults.
//!
//! - [`Config`]: tuning of the bundled LSM engine
//! - [`DbOptions`]: construction-time options of a [`Db`](crate::Db) handle
//! - [`OpenOptions`], [`ReadOptions`], [`WriteOptions`]: per-call options

use crate::codec::{JsonDecode, KeyEncoding, ValueEncoding};

/// Engine configuration for the LSM backend
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // SSTable Configuration
    // -------------------------------------------------------------------------
    /// Verify the data checksum of every SSTable when it is opened
    pub paranoid_checks: bool,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            paranoid_checks: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Verify SSTable checksums on open
    pub fn paranoid_checks(mut self, enabled: bool) -> Self {
        self.config.paranoid_checks = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Handle Options
// =============================================================================

/// Construction-time options of a store handle
#[derive(Debug, Clone, Default)]
pub struct DbOptions {
    /// How keys read back from the store are presented
    pub key_encoding: KeyEncoding,

    /// How values are serialized and deserialized
    pub value_encoding: ValueEncoding,

    /// What a `Json` value decode does with malformed bytes
    pub json_decode: JsonDecode,

    /// Tuning for the bundled engine (ignored by custom backends)
    pub engine: Config,
}

impl DbOptions {
    /// Create a new options builder
    pub fn builder() -> DbOptionsBuilder {
        DbOptionsBuilder::default()
    }
}

/// Builder for DbOptions
#[derive(Default)]
pub struct DbOptionsBuilder {
    options: DbOptions,
}

impl DbOptionsBuilder {
    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.options.key_encoding = encoding;
        self
    }

    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.options.value_encoding = encoding;
        self
    }

    pub fn json_decode(mut self, policy: JsonDecode) -> Self {
        self.options.json_decode = policy;
        self
    }

    pub fn engine(mut self, config: Config) -> Self {
        self.options.engine = config;
        self
    }

    pub fn build(self) -> DbOptions {
        self.options
    }
}

// =============================================================================
// Per-call Options
// =============================================================================

/// Options for [`Db::open`](crate::Db::open)
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Create the store if the location holds none
    pub create_if_missing: bool,

    /// Fail if the location already holds a store
    pub error_if_exists: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

/// Options for point reads
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// When false, a `Buffer`-encoded value is handed back as a string
    pub as_buffer: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { as_buffer: true }
    }
}

/// Options for writes
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the WAL before the write is acknowledged
    pub sync: bool,
}
