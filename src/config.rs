//! Runtime configuration
//!
//! # Example
//! ```ignore
//! use colindex::config::{IndexConfig, RowLockMode, StoreConfig, JournalMode};
//!
//! // Default: no row locking, cardinality tracked
//! let config = IndexConfig::default();
//!
//! // Serialize concurrent writers to the same row
//! let config = IndexConfig::new(RowLockMode::Striped).lock_stripes(128);
//!
//! // Durable in-process store
//! let store = StoreConfig::new(JournalMode::Sync).path("./data");
//! ```

use std::path::{Path, PathBuf};

/// Default name of the system table holding index definitions
pub const DEFAULT_METADATA_TABLE: &str = "__colindex_meta";

/// Row serialization for the snapshot -> write -> delta sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowLockMode {
    /// No locking. A concurrent writer landing between snapshot and write can
    /// leave the index computed against a stale baseline.
    #[default]
    Disabled,

    /// Mutations hashing to the same stripe run one at a time
    Striped,
}

impl RowLockMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "none" => RowLockMode::Disabled,
            "on" | "striped" | "row" | "rows" => RowLockMode::Striped,
            _ => RowLockMode::default(),
        }
    }
}

/// Index layer configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub row_locks: RowLockMode,
    /// Number of lock stripes when `row_locks` is `Striped`
    pub lock_stripes: usize,
    /// Maintain the per-index entry counter
    pub track_cardinality: bool,
    /// System table holding index definitions
    pub metadata_table: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            row_locks: RowLockMode::default(),
            lock_stripes: 64,
            track_cardinality: true,
            metadata_table: DEFAULT_METADATA_TABLE.to_string(),
        }
    }
}

impl IndexConfig {
    pub fn new(row_locks: RowLockMode) -> Self {
        Self {
            row_locks,
            ..Default::default()
        }
    }

    pub fn row_locks(mut self, mode: RowLockMode) -> Self {
        self.row_locks = mode;
        self
    }

    pub fn lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes.max(1);
        self
    }

    pub fn track_cardinality(mut self, enabled: bool) -> Self {
        self.track_cardinality = enabled;
        self
    }

    pub fn metadata_table(mut self, name: impl Into<String>) -> Self {
        self.metadata_table = name.into();
        self
    }
}

/// Journal mode for the in-process store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Memory only
    #[default]
    Disabled,
    /// Append + flush every record
    Sync,
}

impl JournalMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "none" | "memory" => JournalMode::Disabled,
            "sync" | "disk" | "durable" => JournalMode::Sync,
            _ => JournalMode::default(),
        }
    }
}

/// In-process store configuration
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub journal: JournalMode,
    /// Journal directory (required for `JournalMode::Sync`)
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(journal: JournalMode) -> Self {
        Self { journal, path: None }
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }
}
