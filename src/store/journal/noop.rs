//! No-Op Journal Implementation
//!
//! Nothing is written; the store lives only in memory.

use super::{Journal, JournalEntry, JournalOp, Lsn};
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// A journal that does nothing (null object pattern)
pub struct NoOpJournal {
    lsn: AtomicU64,
}

impl NoOpJournal {
    pub fn new() -> Self {
        Self {
            lsn: AtomicU64::new(0),
        }
    }
}

impl Default for NoOpJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal for NoOpJournal {
    fn append(&self, _op: &JournalOp) -> Result<Lsn> {
        Ok(self.lsn.fetch_add(1, Ordering::Relaxed))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JournalEntry>> {
        Ok(vec![])
    }

    fn size_bytes(&self) -> u64 {
        0
    }

    fn current_lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Relaxed)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
