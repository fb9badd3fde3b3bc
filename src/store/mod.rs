//! Wide-Column Store Interface
//!
//! The index layer only talks to storage through these two traits:
//! - `Store`: table lifecycle (create / drop / exists / open)
//! - `Table`: row-level get / put / delete / scan on one table
//!
//! `Table` is object safe, so write-path decorators stack as a chain of
//! `Arc<dyn Table>` (see `IndexedTable`).
//!
//! Addressing: row keys and qualifiers are raw bytes, column families are
//! named. An empty qualifier list means "every column of the family".

mod memory;
mod stats;
pub mod journal;

pub use memory::{MemoryStore, MemoryTable};
pub use stats::{IoCounts, IoStats};

use crate::error::Result;
use crate::types::{Column, FamilyMap, RowResult};
use std::sync::Arc;

/// One open table
pub trait Table: Send + Sync {
    /// Table name
    fn name(&self) -> &str;

    /// Column families declared at creation
    fn families(&self) -> Vec<String>;

    /// Read the given qualifiers of one row (all of the family if empty).
    /// A missing row yields an empty map.
    fn get(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<FamilyMap>;

    /// Write a single column
    fn put(
        &self,
        row: &[u8],
        family: &str,
        qualifier: &[u8],
        value: &[u8],
        timestamp: Option<u64>,
    ) -> Result<()> {
        let column = Column {
            qualifier: qualifier.to_vec(),
            value: value.to_vec(),
            timestamp,
        };
        self.put_columns(row, family, std::slice::from_ref(&column))
    }

    /// Write several columns of one family in one row
    fn put_columns(&self, row: &[u8], family: &str, columns: &[Column]) -> Result<()>;

    /// Delete the given qualifiers (the whole family of the row if empty)
    fn delete(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<()>;

    /// Rows in `[start, end)` (empty `end` = unbounded) that hold at least one
    /// of the requested columns, in row-key order.
    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        family: &str,
        qualifiers: &[&[u8]],
    ) -> Result<Vec<RowResult>>;

    /// Release the handle. Data is kept.
    fn close(&self) -> Result<()>;
}

/// Table lifecycle
pub trait Store: Send + Sync {
    fn create_table(&self, name: &str, families: &[&str]) -> Result<()>;

    fn drop_table(&self, name: &str) -> Result<()>;

    fn table_exists(&self, name: &str) -> bool;

    fn open_table(&self, name: &str) -> Result<Arc<dyn Table>>;

    fn table_names(&self) -> Vec<String>;
}
