//! Mutation interceptor.
//!
//! `IndexedTable` wraps a base `Table` and keeps its secondary indexes in step
//! with every put and delete that goes through it. Reads and scans are
//! forwarded untouched. Because it is itself a `Table`, other write-path
//! decorators stack around or beneath it as an explicit chain.
//!
//! Per mutation:
//! 1. gate: union of covered columns over the active indexes; empty -> plain write
//! 2. snapshot the covered columns of the row (old image)
//! 3. overlay the written values on a clone (new image), check unique indexes
//! 4. base write
//! 5. for each affected index: delete old entry, insert new entry
//!
//! Without row locking, a concurrent writer to the same row that lands
//! between steps 2 and 4 leaves the index computed against a stale old image.
//! `RowLockMode::Striped` serializes steps 2-5 per row stripe. A store error in
//! step 5 surfaces after the base write has landed; nothing is rolled back.
//!
//! Index creation and drop wait for in-flight mutations and block new ones
//! until the registry has been swapped, so a backfill never misses a write.
//!
//! Each handle keeps its own registry. When another handle drops an index,
//! this handle's next covered write lands in the base table and then fails
//! with `TableNotFound` for the index table; the registry is reloaded from
//! metadata at that point, so later writes go through. The cardinality
//! counter is serialized per handle only: concurrent writers through two
//! handles of one table can leave it off by the number of racing inserts.
//! Use one `IndexedTable` per base table when the counter has to be exact.
//!
//! Drop indexed base tables through `IndexedTable::drop_table`. A plain
//! `Store::drop_table` leaves the index tables and their metadata behind,
//! and a later table of the same name would inherit them.

use crate::builder::IndexBuilder;
use crate::codec::{DocumentCodec, JsonCodec};
use crate::config::{IndexConfig, RowLockMode};
use crate::definition::IndexDefinition;
use crate::error::{Error, Result};
use crate::metadata::IndexMetadataStore;
use crate::snapshot::RowMap;
use crate::store::{Store, Table};
use crate::types::{Column, FamilyMap, Qualifier, RowKey, RowResult};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Immutable set of active builders, swapped whole on create/drop
pub type Registry = Arc<Vec<Arc<IndexBuilder>>>;

pub struct IndexedTable {
    base: Arc<dyn Table>,
    store: Arc<dyn Store>,
    metadata: IndexMetadataStore,
    registry: RwLock<Registry>,
    /// Shared by mutations, exclusive for create_index / drop_index, so no
    /// write runs against a registry that is about to change
    admin: RwLock<()>,
    row_locks: Vec<Mutex<()>>,
    config: IndexConfig,
}

impl IndexedTable {
    /// Open `table` from `store` with default config
    pub fn open(store: Arc<dyn Store>, table: &str) -> Result<Self> {
        Self::open_with_config(store, table, IndexConfig::default())
    }

    pub fn open_with_config(store: Arc<dyn Store>, table: &str, config: IndexConfig) -> Result<Self> {
        let base = store.open_table(table)?;
        Self::wrap(store, base, config)
    }

    /// Decorate an already open table (possibly another decorator)
    pub fn wrap(store: Arc<dyn Store>, base: Arc<dyn Table>, config: IndexConfig) -> Result<Self> {
        Self::wrap_with_codec(store, base, config, Arc::new(JsonCodec))
    }

    /// Like `wrap`, persisting definitions through `codec`
    pub fn wrap_with_codec(
        store: Arc<dyn Store>,
        base: Arc<dyn Table>,
        config: IndexConfig,
        codec: Arc<dyn DocumentCodec>,
    ) -> Result<Self> {
        let metadata = IndexMetadataStore::with_codec(Arc::clone(&store), &config, codec);
        let row_locks = match config.row_locks {
            RowLockMode::Disabled => Vec::new(),
            RowLockMode::Striped => (0..config.lock_stripes.max(1)).map(|_| Mutex::new(())).collect(),
        };

        let table = Self {
            base,
            store,
            metadata,
            registry: RwLock::new(Arc::new(Vec::new())),
            admin: RwLock::new(()),
            row_locks,
            config,
        };
        table.refresh()?;
        Ok(table)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Current registry snapshot
    pub fn builders(&self) -> Registry {
        self.registry.read().clone()
    }

    /// Active index definitions
    pub fn indexes(&self) -> Vec<IndexDefinition> {
        self.builders().iter().map(|b| b.definition().clone()).collect()
    }

    pub fn index(&self, name: &str) -> Option<Arc<IndexBuilder>> {
        self.builders().iter().find(|b| b.name() == name).cloned()
    }

    /// Reload the registry from the metadata store
    pub fn refresh(&self) -> Result<()> {
        let builders: Vec<Arc<IndexBuilder>> = self
            .metadata
            .load(self.base.name())?
            .into_iter()
            .map(Arc::new)
            .collect();
        let count = builders.len();
        *self.registry.write() = Arc::new(builders);
        debug!(table = self.base.name(), indexes = count, "index registry refreshed");
        Ok(())
    }

    /// Validate, create the backing table, backfill, persist, refresh
    pub fn create_index(&self, definition: IndexDefinition) -> Result<()> {
        let _admin = self.admin.write();
        let registry = self.builders();

        if registry.iter().any(|b| b.name() == definition.name()) {
            return Err(Error::validation(format!(
                "index '{}' already exists on '{}'",
                definition.name(),
                self.base.name()
            )));
        }
        if let Some(existing) = registry
            .iter()
            .find(|b| b.definition().cover_same_columns(&definition))
        {
            return Err(Error::validation(format!(
                "index '{}' covers the same columns as '{}'",
                definition.name(),
                existing.name()
            )));
        }
        if !self.base.families().iter().any(|f| f == definition.family()) {
            return Err(Error::FamilyNotFound {
                table: self.base.name().to_string(),
                family: definition.family().to_string(),
            });
        }

        // Encode up front so a bad definition never gets a table
        let encoded = self.metadata.encode(&definition)?;
        let name = definition.name().to_string();
        let builder = IndexBuilder::create(self.store.as_ref(), definition, self.config.track_cardinality)?;

        let persisted = builder
            .rebuild(self.base.as_ref())
            .and_then(|_| self.metadata.add_encoded(self.base.name(), &name, &encoded));
        if let Err(e) = persisted {
            self.discard_backing_table(&builder);
            return Err(e);
        }

        self.refresh()?;
        debug!(table = self.base.name(), index = %name, "index created");
        Ok(())
    }

    /// Remove metadata and backing table; unknown names are a no-op
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let _admin = self.admin.write();
        let Some(builder) = self.index(name) else {
            debug!(table = self.base.name(), index = name, "drop of unknown index ignored");
            return Ok(());
        };

        self.remove_index(&builder)?;
        self.refresh()?;
        debug!(table = self.base.name(), index = name, "index dropped");
        Ok(())
    }

    /// Drop every index of the base table, then the base table itself.
    /// The handle is unusable afterwards.
    pub fn drop_table(&self) -> Result<()> {
        let _admin = self.admin.write();
        let registry = self.builders();
        for builder in registry.iter() {
            self.remove_index(builder)?;
        }
        // Entries whose builder could not be loaded still hold metadata
        self.metadata.remove_all(self.base.name())?;
        *self.registry.write() = Arc::new(Vec::new());

        self.base.close()?;
        self.store.drop_table(self.base.name())?;
        debug!(table = self.base.name(), indexes = registry.len(), "indexed table dropped");
        Ok(())
    }

    fn remove_index(&self, builder: &IndexBuilder) -> Result<()> {
        self.metadata.remove(self.base.name(), builder.name())?;
        builder.close()?;
        let table_name = builder.definition().table_name();
        if self.store.table_exists(table_name) {
            self.store.drop_table(table_name)?;
        }
        Ok(())
    }

    /// Best-effort teardown after a failed create; the caller keeps its error
    fn discard_backing_table(&self, builder: &IndexBuilder) {
        let table_name = builder.definition().table_name();
        if let Err(e) = builder.close() {
            warn!(index = builder.name(), error = %e, "closing aborted index failed");
        }
        if let Err(e) = self.store.drop_table(table_name) {
            warn!(index = builder.name(), error = %e, "dropping aborted index table failed");
        }
    }

    /// A missing index table means another handle dropped the index; reload
    /// the registry so the next write skips it. Returns `err` unchanged.
    fn heal_registry(&self, registry: &Registry, err: Error) -> Error {
        if let Error::TableNotFound(name) = &err {
            if registry.iter().any(|b| b.definition().table_name() == name) {
                warn!(table = self.base.name(), index = %name, "index table gone, reloading registry");
                if let Err(e) = self.refresh() {
                    warn!(table = self.base.name(), error = %e, "registry reload failed");
                }
            }
        }
        err
    }

    /// Base rows matching `values` through index `name`
    pub fn lookup(&self, name: &str, values: &[&[u8]]) -> Result<Vec<RowKey>> {
        let builder = self
            .index(name)
            .ok_or_else(|| Error::validation(format!("no index named '{name}'")))?;
        builder.lookup(values)
    }

    /// Union of covered columns over the indexes this mutation touches
    fn covered_columns(registry: &[Arc<IndexBuilder>], family: &str, qualifiers: &[&[u8]]) -> BTreeSet<Qualifier> {
        let mut covered = BTreeSet::new();
        for builder in registry {
            covered.extend(builder.definition().find_covered_columns(family, qualifiers));
        }
        covered
    }

    fn lock_row(&self, row: &[u8]) -> Option<MutexGuard<'_, ()>> {
        if self.row_locks.is_empty() {
            return None;
        }
        let stripe = (seahash::hash(row) % self.row_locks.len() as u64) as usize;
        Some(self.row_locks[stripe].lock())
    }

    fn snapshot(&self, row: &[u8], family: &str, covered: &BTreeSet<Qualifier>) -> Result<RowMap> {
        let qualifiers: Vec<&[u8]> = covered.iter().map(Vec::as_slice).collect();
        Ok(RowMap::from_family(family, self.base.get(row, family, &qualifiers)?))
    }

    fn apply_deltas(
        affected: &[&Arc<IndexBuilder>],
        row: &[u8],
        old: &RowMap,
        new: &RowMap,
    ) -> Result<()> {
        for builder in affected {
            builder.delete_index(row, old)?;
            builder.insert_index(row, new)?;
            trace!(index = builder.name(), "index delta applied");
        }
        Ok(())
    }
}

impl Table for IndexedTable {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn families(&self) -> Vec<String> {
        self.base.families()
    }

    fn get(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<FamilyMap> {
        self.base.get(row, family, qualifiers)
    }

    fn put_columns(&self, row: &[u8], family: &str, columns: &[Column]) -> Result<()> {
        if columns.is_empty() {
            return self.base.put_columns(row, family, columns);
        }
        let qualifiers: Vec<&[u8]> = columns.iter().map(|c| c.qualifier.as_slice()).collect();
        let _admin = self.admin.read();
        let registry = self.builders();
        let covered = Self::covered_columns(&registry, family, &qualifiers);
        if covered.is_empty() {
            trace!(table = self.base.name(), family, "put not covered by any index");
            return self.base.put_columns(row, family, columns);
        }

        let _row = self.lock_row(row);
        let old = self.snapshot(row, family, &covered)?;
        let new = old.overlay(family, columns);

        let affected: Vec<&Arc<IndexBuilder>> = registry
            .iter()
            .filter(|b| b.definition().cover(family, &qualifiers))
            .collect();
        for builder in &affected {
            builder.check_unique(row, &new)?;
        }

        self.base.put_columns(row, family, columns)?;
        Self::apply_deltas(&affected, row, &old, &new).map_err(|e| self.heal_registry(&registry, e))
    }

    fn delete(&self, row: &[u8], family: &str, qualifiers: &[&[u8]]) -> Result<()> {
        let _admin = self.admin.read();
        let registry = self.builders();
        let covered = Self::covered_columns(&registry, family, qualifiers);
        if covered.is_empty() {
            trace!(table = self.base.name(), family, "delete not covered by any index");
            return self.base.delete(row, family, qualifiers);
        }

        let _row = self.lock_row(row);
        let old = self.snapshot(row, family, &covered)?;
        let new = old.without(family, qualifiers);

        let affected: Vec<&Arc<IndexBuilder>> = registry
            .iter()
            .filter(|b| b.definition().cover(family, qualifiers))
            .collect();

        self.base.delete(row, family, qualifiers)?;
        Self::apply_deltas(&affected, row, &old, &new).map_err(|e| self.heal_registry(&registry, e))
    }

    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        family: &str,
        qualifiers: &[&[u8]],
    ) -> Result<Vec<RowResult>> {
        self.base.scan(start, end, family, qualifiers)
    }

    /// Close the base table, then every index
    fn close(&self) -> Result<()> {
        self.base.close()?;
        for builder in self.builders().iter() {
            builder.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, IndexedTable) {
        let store = Arc::new(MemoryStore::new());
        store.create_table("employees", &["profile", "misc"]).unwrap();
        let table = IndexedTable::open(store.clone(), "employees").unwrap();
        (store, table)
    }

    fn by_dept() -> IndexDefinition {
        IndexDefinition::new("byDept", "profile", ["dept"]).unwrap()
    }

    #[test]
    fn test_update_moves_entry() {
        let (_store, table) = setup();
        table.create_index(by_dept()).unwrap();

        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();
        assert_eq!(table.lookup("byDept", &[b"eng"]).unwrap(), vec![b"e1".to_vec()]);

        table.put(b"e1", "profile", b"dept", b"sales", None).unwrap();
        assert!(table.lookup("byDept", &[b"eng"]).unwrap().is_empty());
        assert_eq!(table.lookup("byDept", &[b"sales"]).unwrap(), vec![b"e1".to_vec()]);
    }

    #[test]
    fn test_uncovered_write_skips_snapshot() {
        let (store, table) = setup();
        table.create_index(by_dept()).unwrap();
        store.reset_io_stats();

        table.put(b"e1", "profile", b"name", b"ada", None).unwrap();
        table.put(b"e1", "misc", b"dept", b"eng", None).unwrap();

        let base = store.io_stats("employees").unwrap();
        assert_eq!(base.gets, 0);
        assert_eq!(base.puts, 2);
        assert_eq!(store.io_stats("byDept").unwrap().writes(), 0);
    }

    #[test]
    fn test_duplicate_name_and_columns_rejected() {
        let (_store, table) = setup();
        table.create_index(by_dept()).unwrap();

        let same_name = IndexDefinition::new("byDept", "profile", ["city"]).unwrap();
        assert!(matches!(table.create_index(same_name), Err(Error::Validation(_))));

        let same_cols = IndexDefinition::new("deptAgain", "profile", ["dept"]).unwrap();
        assert!(matches!(table.create_index(same_cols), Err(Error::Validation(_))));
        assert_eq!(table.indexes().len(), 1);
    }

    #[test]
    fn test_unknown_family_rejected() {
        let (store, table) = setup();
        let def = IndexDefinition::new("byX", "nope", ["x"]).unwrap();
        assert!(matches!(table.create_index(def), Err(Error::FamilyNotFound { .. })));
        assert!(!store.table_exists("byX"));
    }

    #[test]
    fn test_unique_conflict_blocks_base_write() {
        let (_store, table) = setup();
        table.create_index(by_dept().unique(true)).unwrap();
        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();

        let res = table.put(b"e2", "profile", b"dept", b"eng", None);
        assert!(matches!(res, Err(Error::UniqueViolation { .. })));
        assert!(table.get(b"e2", "profile", &[]).unwrap().is_empty());

        // Rewriting the owner's own value is fine
        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();
    }

    #[test]
    fn test_delete_removes_entry() {
        let (_store, table) = setup();
        table.create_index(by_dept()).unwrap();
        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();

        table.delete(b"e1", "profile", &[b"dept".as_slice()]).unwrap();
        assert!(table.lookup("byDept", &[b"eng"]).unwrap().is_empty());
        assert_eq!(table.index("byDept").unwrap().cardinality().unwrap(), 0);
    }

    #[test]
    fn test_drop_index_idempotent() {
        let (store, table) = setup();
        table.create_index(by_dept()).unwrap();
        table.drop_index("byDept").unwrap();
        table.drop_index("byDept").unwrap();

        assert!(!store.table_exists("byDept"));
        assert!(table.indexes().is_empty());
    }

    #[test]
    fn test_striped_locks_still_maintain() {
        let store = Arc::new(MemoryStore::new());
        store.create_table("employees", &["profile"]).unwrap();
        let config = IndexConfig::new(RowLockMode::Striped).lock_stripes(4);
        let table = IndexedTable::open_with_config(store, "employees", config).unwrap();
        table.create_index(by_dept()).unwrap();

        table.put(b"e1", "profile", b"dept", b"eng", None).unwrap();
        assert_eq!(table.lookup("byDept", &[b"eng"]).unwrap().len(), 1);
    }

    /// Store whose table drops always fail
    struct NoDropStore(MemoryStore);

    impl Store for NoDropStore {
        fn create_table(&self, name: &str, families: &[&str]) -> Result<()> {
            self.0.create_table(name, families)
        }

        fn drop_table(&self, name: &str) -> Result<()> {
            Err(Error::Closed(name.to_string()))
        }

        fn table_exists(&self, name: &str) -> bool {
            self.0.table_exists(name)
        }

        fn open_table(&self, name: &str) -> Result<Arc<dyn Table>> {
            self.0.open_table(name)
        }

        fn table_names(&self) -> Vec<String> {
            self.0.table_names()
        }
    }

    #[test]
    fn test_failed_cleanup_keeps_backfill_error() {
        let inner = MemoryStore::new();
        inner.create_table("employees", &["profile"]).unwrap();
        let base = inner.open_table("employees").unwrap();
        base.put(b"e1", "profile", b"dept", b"eng", None).unwrap();
        base.put(b"e2", "profile", b"dept", b"eng", None).unwrap();

        let table = IndexedTable::open(Arc::new(NoDropStore(inner.clone())), "employees").unwrap();
        let res = table.create_index(by_dept().unique(true));

        assert!(matches!(res, Err(Error::UniqueViolation { .. })));
        // Teardown failed quietly; the table is left for a later drop
        assert!(inner.table_exists("byDept"));
        assert!(table.indexes().is_empty());
    }

    #[test]
    fn test_empty_put_bypasses_gate() {
        let (store, table) = setup();
        table.create_index(by_dept()).unwrap();
        store.reset_io_stats();

        table.put_columns(b"e1", "profile", &[]).unwrap();
        assert_eq!(store.io_stats("employees").unwrap().gets, 0);
    }
}
