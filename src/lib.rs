// colindex v0.1.0 - Transparent Secondary Indexes for Wide-Column Tables
//
// Writes that go through an `IndexedTable` keep every registered index on the
// touched columns current; callers never see the index tables.

pub mod error;
pub mod config;
pub mod types;
pub mod key;
pub mod codec;
pub mod snapshot;
pub mod definition;
pub mod store;
pub mod builder;
pub mod metadata;
pub mod interceptor;

// Re-export main types
pub use error::{Error, Result};
pub use config::{IndexConfig, RowLockMode, StoreConfig, JournalMode};
pub use types::{Cell, Column, RowResult, RowKey};
pub use definition::IndexDefinition;
pub use snapshot::RowMap;
pub use store::{Store, Table, MemoryStore};
pub use builder::IndexBuilder;
pub use metadata::IndexMetadataStore;
pub use interceptor::IndexedTable;
