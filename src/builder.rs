//! Index builder: one definition bound to its backing index table.
//!
//! Backing table layout:
//! - family `entries`
//!   - non-unique: row = key(values) ++ segment(base row), column `_`
//!   - unique: row = key(values), column = base row
//!   - cell value: presence marker, or the encoded include columns
//! - family `stats`: row `__count__`, column `rows`, big-endian i64 entry count

use crate::definition::IndexDefinition;
use crate::error::{Error, Result};
use crate::key;
use crate::snapshot::RowMap;
use crate::store::{Store, Table};
use crate::types::RowKey;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub const ENTRY_FAMILY: &str = "entries";
pub const STATS_FAMILY: &str = "stats";
pub const COUNTER_ROW: &[u8] = b"__count__";
pub const COUNTER_COLUMN: &[u8] = b"rows";
pub const MARKER_COLUMN: &[u8] = b"_";
pub const MARKER_VALUE: &[u8] = &[1];

/// Location and payload of one index entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryCell {
    row: Vec<u8>,
    column: Vec<u8>,
    value: Vec<u8>,
}

pub struct IndexBuilder {
    definition: IndexDefinition,
    table: Arc<dyn Table>,
    track_cardinality: bool,
    /// Serializes counter read-modify-write
    counter: Mutex<()>,
}

impl IndexBuilder {
    /// Create the backing table and bind to it
    pub fn create(store: &dyn Store, definition: IndexDefinition, track_cardinality: bool) -> Result<Self> {
        store.create_table(definition.table_name(), &[ENTRY_FAMILY, STATS_FAMILY])?;
        debug!(index = definition.name(), "index table created");
        Self::open(store, definition, track_cardinality)
    }

    /// Bind to an existing backing table
    pub fn open(store: &dyn Store, definition: IndexDefinition, track_cardinality: bool) -> Result<Self> {
        let table = store.open_table(definition.table_name())?;
        Ok(Self {
            definition,
            table,
            track_cardinality,
            counter: Mutex::new(()),
        })
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// None when any covered column is missing from the snapshot
    fn entry_for(&self, row: &[u8], snapshot: &RowMap) -> Option<EntryCell> {
        let def = &self.definition;
        let values = snapshot.values_for(def.family(), def.key_qualifiers())?;

        let include: Vec<Vec<u8>> = def.include_columns().iter().map(|c| c.as_bytes().to_vec()).collect();
        let value = if include.is_empty() {
            MARKER_VALUE.to_vec()
        } else {
            key::encode_key(&snapshot.values_for(def.family(), &include)?)
        };

        Some(if def.is_unique() {
            EntryCell {
                row: key::encode_key(&values),
                column: row.to_vec(),
                value,
            }
        } else {
            EntryCell {
                row: key::encode_entry_key(&values, row),
                column: MARKER_COLUMN.to_vec(),
                value,
            }
        })
    }

    /// Fail if a unique index already maps the snapshot's key to another row
    pub fn check_unique(&self, row: &[u8], snapshot: &RowMap) -> Result<()> {
        if !self.definition.is_unique() {
            return Ok(());
        }
        let Some(entry) = self.entry_for(row, snapshot) else {
            return Ok(());
        };
        let owners = self.table.get(&entry.row, ENTRY_FAMILY, &[])?;
        if let Some(owner) = owners.keys().find(|owner| owner.as_slice() != row) {
            warn!(index = self.name(), "unique key already taken");
            return Err(Error::UniqueViolation {
                index: self.name().to_string(),
                row: owner.clone(),
            });
        }
        Ok(())
    }

    /// Write the entry for `row` built from `snapshot`. Returns false when the
    /// snapshot lacks a covered column and nothing was written.
    pub fn insert_index(&self, row: &[u8], snapshot: &RowMap) -> Result<bool> {
        let Some(entry) = self.entry_for(row, snapshot) else {
            trace!(index = self.name(), "insert skipped, covered columns incomplete");
            return Ok(false);
        };

        if !self.track_cardinality {
            self.table.put(&entry.row, ENTRY_FAMILY, &entry.column, &entry.value, None)?;
            return Ok(true);
        }

        let _counter = self.counter.lock();
        let existed = !self
            .table
            .get(&entry.row, ENTRY_FAMILY, &[entry.column.as_slice()])?
            .is_empty();
        self.table.put(&entry.row, ENTRY_FAMILY, &entry.column, &entry.value, None)?;
        if !existed {
            self.bump_counter(1)?;
        }
        Ok(true)
    }

    /// Remove the entry for `row` built from `snapshot`. Returns false when
    /// the snapshot lacks a covered column.
    pub fn delete_index(&self, row: &[u8], snapshot: &RowMap) -> Result<bool> {
        let Some(entry) = self.entry_for(row, snapshot) else {
            trace!(index = self.name(), "delete skipped, covered columns incomplete");
            return Ok(false);
        };

        if !self.track_cardinality {
            self.table.delete(&entry.row, ENTRY_FAMILY, &[entry.column.as_slice()])?;
            return Ok(true);
        }

        let _counter = self.counter.lock();
        let existed = !self
            .table
            .get(&entry.row, ENTRY_FAMILY, &[entry.column.as_slice()])?
            .is_empty();
        if existed {
            self.table.delete(&entry.row, ENTRY_FAMILY, &[entry.column.as_slice()])?;
            self.bump_counter(-1)?;
        }
        Ok(true)
    }

    /// Backfill from every row of `base`. Safe to re-run: entries are
    /// overwritten in place and the counter only moves for new ones.
    pub fn rebuild(&self, base: &dyn Table) -> Result<usize> {
        let def = &self.definition;
        let covered: Vec<&[u8]> = def.covered_qualifiers().iter().map(Vec::as_slice).collect();
        let rows = base.scan(b"", b"", def.family(), &covered)?;

        let mut inserted = 0;
        for result in rows {
            let columns = result.families.into_iter().next().map(|(_, cols)| cols).unwrap_or_default();
            let snapshot = RowMap::from_family(def.family(), columns);
            self.check_unique(&result.row, &snapshot)?;
            if self.insert_index(&result.row, &snapshot)? {
                inserted += 1;
            }
        }
        debug!(index = self.name(), inserted, "index rebuilt");
        Ok(inserted)
    }

    /// Base rows whose key columns equal `values`
    pub fn lookup(&self, values: &[&[u8]]) -> Result<Vec<RowKey>> {
        let expected = self.definition.key_qualifiers().len();
        if values.len() != expected {
            return Err(Error::validation(format!(
                "index '{}' has {expected} key columns, got {} values",
                self.name(),
                values.len()
            )));
        }

        let prefix = key::encode_key(values);
        if self.definition.is_unique() {
            let owners = self.table.get(&prefix, ENTRY_FAMILY, &[])?;
            return Ok(owners.into_keys().collect());
        }

        let entries = self
            .table
            .scan(&prefix, &key::prefix_end(&prefix), ENTRY_FAMILY, &[MARKER_COLUMN])?;
        entries
            .into_iter()
            .map(|entry| {
                key::decode_segments(&entry.row)?
                    .pop()
                    .ok_or_else(|| Error::serialization("index entry without row segment"))
            })
            .collect()
    }

    /// Live entry count (0 when cardinality is not tracked)
    pub fn cardinality(&self) -> Result<i64> {
        let cells = self.table.get(COUNTER_ROW, STATS_FAMILY, &[COUNTER_COLUMN])?;
        Ok(cells.get(COUNTER_COLUMN).map(|cell| decode_counter(&cell.value)).unwrap_or(0))
    }

    fn bump_counter(&self, delta: i64) -> Result<()> {
        let current = self.cardinality()?;
        let next = (current + delta).max(0);
        self.table.put(COUNTER_ROW, STATS_FAMILY, COUNTER_COLUMN, &next.to_be_bytes(), None)
    }

    /// Release the backing table handle. Data stays.
    pub fn close(&self) -> Result<()> {
        self.table.close()
    }
}

fn decode_counter(bytes: &[u8]) -> i64 {
    <[u8; 8]>::try_from(bytes).map(i64::from_be_bytes).unwrap_or(0)
}
