//! Journal Trait Definitions

use crate::error::Result;
use crate::types::Cell;
use serde::{Deserialize, Serialize};

/// Log Sequence Number
pub type Lsn = u64;

/// A single journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub lsn: Lsn,
    pub op: JournalOp,
}

/// Store mutations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    CreateTable {
        name: String,
        families: Vec<String>,
    },
    DropTable {
        name: String,
    },
    /// Cells carry their resolved timestamps
    Put {
        table: String,
        row: Vec<u8>,
        family: String,
        cells: Vec<(Vec<u8>, Cell)>,
    },
    /// Empty `qualifiers` = whole family of the row
    Delete {
        table: String,
        row: Vec<u8>,
        family: String,
        qualifiers: Vec<Vec<u8>>,
    },
}

/// Journal trait
///
/// Implementations:
/// - `NoOpJournal`: memory-only store, nothing is logged
/// - `DiskJournal`: framed append-only file, flushed per record
pub trait Journal: Send + Sync {
    /// Append an operation, returns its LSN
    fn append(&self, op: &JournalOp) -> Result<Lsn>;

    /// Force fsync to disk
    fn sync(&self) -> Result<()>;

    /// Every intact entry, oldest first
    fn replay(&self) -> Result<Vec<JournalEntry>>;

    /// Current journal size in bytes
    fn size_bytes(&self) -> u64;

    /// Next LSN to be assigned
    fn current_lsn(&self) -> Lsn;

    fn is_enabled(&self) -> bool;
}
