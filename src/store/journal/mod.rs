//! Journal Module
//!
//! Durability for the in-process store, selectable at runtime:
//! - `JournalMode::Disabled` -> `NoOpJournal` (memory only)
//! - `JournalMode::Sync` -> `DiskJournal` (append + flush per record)
//!
//! # Example
//! ```ignore
//! use colindex::config::{JournalMode, StoreConfig};
//! use colindex::store::journal::create_journal;
//!
//! let journal = create_journal(&StoreConfig::new(JournalMode::Sync).path("./data"))?;
//! ```

mod traits;
mod noop;
mod disk;

pub use traits::{Journal, JournalEntry, JournalOp, Lsn};
pub use noop::NoOpJournal;
pub use disk::{DiskJournal, JOURNAL_FILE};

use crate::config::{JournalMode, StoreConfig};
use crate::error::{Error, Result};

/// Create the journal described by `config`
pub fn create_journal(config: &StoreConfig) -> Result<Box<dyn Journal>> {
    match config.journal {
        JournalMode::Disabled => Ok(Box::new(NoOpJournal::new())),
        JournalMode::Sync => match config.path.as_deref() {
            Some(dir) => Ok(Box::new(DiskJournal::new(dir)?)),
            None => Err(Error::validation("journal mode 'sync' requires a path")),
        },
    }
}
