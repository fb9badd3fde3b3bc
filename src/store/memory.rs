//! In-process wide-column store.
//!
//! Rows live in a `BTreeMap` per table (row key order = scan order), tables in
//! a `DashMap`. Every mutation is journaled under the table's write lock before
//! it is applied, so replay reproduces the same state.

use super::journal::{create_journal, Journal, JournalOp, NoOpJournal};
use super::stats::{IoCounts, IoStats};
use super::{Store, Table};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::types::{Cell, Column, FamilyMap, RowKey, RowResult};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

type Row = BTreeMap<String, FamilyMap>;

struct TableData {
    name: String,
    families: Vec<String>,
    rows: RwLock<BTreeMap<RowKey, Row>>,
    stats: IoStats,
    dropped: AtomicBool,
}

impl TableData {
    fn new(name: &str, families: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            families,
            rows: RwLock::new(BTreeMap::new()),
            stats: IoStats::new(),
            dropped: AtomicBool::new(false),
        }
    }

    fn check_family(&self, family: &str) -> Result<()> {
        if self.families.iter().any(|f| f == family) {
            Ok(())
        } else {
            Err(Error::FamilyNotFound {
                table: self.name.clone(),
                family: family.to_string(),
            })
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.dropped.load(Ordering::Acquire) {
            Err(Error::TableNotFound(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn apply_put(rows: &mut BTreeMap<RowKey, Row>, row: &[u8], family: &str, cells: Vec<(Vec<u8>, Cell)>) {
        let columns = rows
            .entry(row.to_vec())
            .or_default()
            .entry(family.to_string())
            .or_default();
        for (qualifier, cell) in cells {
            columns.insert(qualifier, cell);
        }
    }

    fn apply_delete(rows: &mut BTreeMap<RowKey, Row>, row: &[u8], family: &str, qualifiers: &[Vec<u8>]) {
        let Some(families) = rows.get_mut(row) else { return };
        if qualifiers.is_empty() {
            families.remove(family);
        } else if let Some(columns) = families.get_mut(family) {
            for q in qualifiers {
                columns.remove(q);
            }
            if columns.is_empty() {
                families.remove(family);
            }
        }
        if families.is_empty() {
            rows.remove(row);
        }
    }
}

/// Keep only the requested qualifiers (all if none requested)
fn select(columns: &FamilyMap, qualifiers: &[&[u8]]) -> FamilyMap {
    if qualifiers.is_empty() {
        return columns.clone();
    }
    qualifiers
        .iter()
        .filter_map(|q| columns.get(*q).map(|cell| (q.to_vec(), cell.clone())))
        .collect()
}

struct StoreInner {
    tables: DashMap<String, Arc<TableData>>,
    journal: Box<dyn Journal>,
    /// Serializes table create/drop with their journal records
    ddl: Mutex<()>,
    clock: AtomicU64,
}

impl StoreInner {
    /// Monotonic millisecond clock
    fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn observe_timestamp(&self, ts: u64) {
        self.clock.fetch_max(ts, Ordering::AcqRel);
    }

    fn table(&self, name: &str) -> Result<Arc<TableData>> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn replay(&self) -> Result<usize> {
        let entries = self.journal.replay()?;
        let count = entries.len();
        for entry in entries {
            match entry.op {
                JournalOp::CreateTable { name, families } => {
                    self.tables
                        .insert(name.clone(), Arc::new(TableData::new(&name, families)));
                }
                JournalOp::DropTable { name } => {
                    self.tables.remove(&name);
                }
                JournalOp::Put { table, row, family, cells } => {
                    if let Some(data) = self.tables.get(&table) {
                        for (_, cell) in &cells {
                            self.observe_timestamp(cell.timestamp);
                        }
                        TableData::apply_put(&mut data.rows.write(), &row, &family, cells);
                    }
                }
                JournalOp::Delete { table, row, family, qualifiers } => {
                    if let Some(data) = self.tables.get(&table) {
                        TableData::apply_delete(&mut data.rows.write(), &row, &family, &qualifiers);
                    }
                }
            }
        }
        Ok(count)
    }
}

/// Ordered in-process store, optionally journaled to disk
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Memory-only store
    pub fn new() -> Self {
        Self::with_journal(Box::new(NoOpJournal::new()))
    }

    fn with_journal(journal: Box<dyn Journal>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: DashMap::new(),
                journal,
                ddl: Mutex::new(()),
                clock: AtomicU64::new(0),
            }),
        }
    }

    /// Open a store per `config`, replaying its journal
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = Self::with_journal(create_journal(config)?);
        let replayed = store.inner.replay()?;
        debug!(replayed, tables = store.inner.tables.len(), "store opened");
        Ok(store)
    }

    /// I/O counters of a table since creation (or the last reset)
    pub fn io_stats(&self, table: &str) -> Option<IoCounts> {
        self.inner.tables.get(table).map(|t| t.stats.snapshot())
    }

    pub fn reset_io_stats(&self) {
        for table in self.inner.tables.iter() {
            table.stats.reset();
        }
    }

    /// fsync the journal
    pub fn sync(&self) -> Result<()> {
        self.inner.journal.sync()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn create_table(&self, name: &str, families: &[&str]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("table name must not be empty"));
        }
        if families.is_empty() {
            return Err(Error::validation(format!(
                "table '{name}' needs at least one column family"
            )));
        }

        let _ddl = self.inner.ddl.lock();
        if self.inner.tables.contains_key(name) {
            return Err(Error::TableExists(name.to_string()));
        }

        let families: Vec<String> = families.iter().map(|f| f.to_string()).collect();
        self.inner.journal.append(&JournalOp::CreateTable {
            name: name.to_string(),
            families: families.clone(),
        })?;
        self.inner
            .tables
            .insert(name.to_string(), Arc::new(TableData::new(name, families)));
        debug!(table = name, "table created");
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let _ddl = self.inner.ddl.lock();
        let data = self.inner.table(name)?;

        // Wait out in-flight writers before the table disappears
        let _rows = data.rows.write();
        self.inner.journal.append(&JournalOp::DropTable {
            name: name.to_string(),
        })?;
        data.dropped.store(true, Ordering::Release);
        self.inner.tables.remove(name);
        debug!(table = name, "table dropped");
        Ok(())
    }

    fn table_exists(&self, name: &str) -> bool {
        self.inner.tables.contains_key(name)
    }

    fn open_table(&self, name: &str) -> Result<Arc<dyn Table>> {
        let data = self.inner.table(name)?;
        Ok(Arc::new(MemoryTable {
            data,
            store: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}

/// Handle to one table of a `MemoryStore`
pub struct MemoryTable {
    data: Arc<TableData>,
    store: Arc<StoreInner>,
    closed: AtomicBool,
}

impl MemoryTable {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(self.data.name.clone()));
        }
        self.data.check_live()
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.data.name
    }

    fn families(&self) -> Vec<String> {
        self.data.families.clone()
    }

    fn get(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<FamilyMap> {
        self.check_open()?;
        self.data.check_family(family)?;
        self.data.stats.record_get();

        let rows = self.data.rows.read();
        Ok(rows
            .get(row)
            .and_then(|families| families.get(family))
            .map(|columns| select(columns, qualifiers))
            .unwrap_or_default())
    }

    fn put_columns(&self, row: &[u8], family: &str, columns: &[Column]) -> Result<()> {
        self.check_open()?;
        self.data.check_family(family)?;
        if columns.is_empty() {
            return Ok(());
        }
        self.data.stats.record_put();

        let cells: Vec<(Vec<u8>, Cell)> = columns
            .iter()
            .map(|c| {
                let ts = match c.timestamp {
                    Some(ts) => {
                        self.store.observe_timestamp(ts);
                        ts
                    }
                    None => self.store.next_timestamp(),
                };
                (c.qualifier.clone(), Cell::new(c.value.clone(), ts))
            })
            .collect();

        let mut rows = self.data.rows.write();
        self.data.check_live()?;
        self.store.journal.append(&JournalOp::Put {
            table: self.data.name.clone(),
            row: row.to_vec(),
            family: family.to_string(),
            cells: cells.clone(),
        })?;
        TableData::apply_put(&mut rows, row, family, cells);
        Ok(())
    }

    fn delete(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<()> {
        self.check_open()?;
        self.data.check_family(family)?;
        self.data.stats.record_delete();

        let qualifiers: Vec<Vec<u8>> = qualifiers.iter().map(|q| q.to_vec()).collect();
        let mut rows = self.data.rows.write();
        self.data.check_live()?;
        if !rows.contains_key(row) {
            return Ok(());
        }
        self.store.journal.append(&JournalOp::Delete {
            table: self.data.name.clone(),
            row: row.to_vec(),
            family: family.to_string(),
            qualifiers: qualifiers.clone(),
        })?;
        TableData::apply_delete(&mut rows, row, family, &qualifiers);
        Ok(())
    }

    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        family: &str,
        qualifiers: &[&[u8]],
    ) -> Result<Vec<RowResult>> {
        self.check_open()?;
        self.data.check_family(family)?;
        self.data.stats.record_scan();

        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_vec())
        };
        if !end.is_empty() && start >= end {
            return Ok(Vec::new());
        }

        let rows = self.data.rows.read();
        let mut out = Vec::new();
        for (key, families) in rows.range((Bound::Included(start.to_vec()), upper)) {
            let Some(columns) = families.get(family) else { continue };
            let selected = select(columns, qualifiers);
            if selected.is_empty() {
                continue;
            }
            let mut result = RowResult::new(key.clone());
            result.families.insert(family.to_string(), selected);
            out.push(result);
        }
        Ok(out)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> &[u8] {
        s.as_bytes()
    }

    fn setup() -> (MemoryStore, Arc<dyn Table>) {
        let store = MemoryStore::new();
        store.create_table("employees", &["profile", "misc"]).unwrap();
        let table = store.open_table("employees").unwrap();
        (store, table)
    }

    #[test]
    fn test_put_get_delete() {
        let (_store, table) = setup();
        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();
        table
            .put_columns(b"e1", "profile", &[Column::new("name", "ada"), Column::new("level", "3")])
            .unwrap();

        let cols = table.get(b"e1", "profile", &[q("dept"), q("name")]).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[q("dept")].value, b"eng");

        let all = table.get(b"e1", "profile", &[]).unwrap();
        assert_eq!(all.len(), 3);

        table.delete(b"e1", "profile", &[q("dept")]).unwrap();
        assert!(table.get(b"e1", "profile", &[q("dept")]).unwrap().is_empty());

        table.delete(b"e1", "profile", &[]).unwrap();
        assert!(table.get(b"e1", "profile", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_and_monotonic_timestamps() {
        let (_store, table) = setup();
        table.put(b"e1", "profile", b"a", b"1", Some(42)).unwrap();
        table.put(b"e1", "profile", b"b", b"2", None).unwrap();
        table.put(b"e1", "profile", b"c", b"3", None).unwrap();

        let cols = table.get(b"e1", "profile", &[]).unwrap();
        assert_eq!(cols[q("a")].timestamp, 42);
        assert!(cols[q("c")].timestamp > cols[q("b")].timestamp);
    }

    #[test]
    fn test_scan_range_and_family() {
        let (_store, table) = setup();
        for row in ["a", "b", "c", "d"] {
            table.put(row.as_bytes(), "profile", b"dept", row.as_bytes(), None).unwrap();
        }
        table.put(b"e", "misc", b"note", b"x", None).unwrap();

        let rows = table.scan(b"b", b"d", "profile", &[]).unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.row.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

        let all = table.scan(b"", b"", "profile", &[q("dept")]).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].value("profile", b"dept"), Some(&b"d"[..]));

        assert!(table.scan(b"", b"", "profile", &[q("missing")]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_family_and_table() {
        let (store, table) = setup();
        assert!(matches!(
            table.put(b"e1", "nope", b"a", b"1", None),
            Err(Error::FamilyNotFound { .. })
        ));
        assert!(matches!(store.open_table("nope"), Err(Error::TableNotFound(_))));
        assert!(matches!(
            store.create_table("employees", &["profile"]),
            Err(Error::TableExists(_))
        ));
    }

    #[test]
    fn test_dropped_and_closed_handles() {
        let (store, table) = setup();
        let other = store.open_table("employees").unwrap();
        other.close().unwrap();
        assert!(matches!(other.get(b"e1", "profile", &[]), Err(Error::Closed(_))));

        store.drop_table("employees").unwrap();
        assert!(!store.table_exists("employees"));
        assert!(matches!(
            table.put(b"e1", "profile", b"a", b"1", None),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_io_stats() {
        let (store, table) = setup();
        table.put(b"e1", "profile", b"a", b"1", None).unwrap();
        table.get(b"e1", "profile", &[]).unwrap();
        table.scan(b"", b"", "profile", &[]).unwrap();

        let counts = store.io_stats("employees").unwrap();
        assert_eq!(counts.puts, 1);
        assert_eq!(counts.gets, 1);
        assert_eq!(counts.scans, 1);

        store.reset_io_stats();
        assert_eq!(store.io_stats("employees").unwrap(), IoCounts::default());
    }
}
