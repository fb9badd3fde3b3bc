//! Index metadata store.
//!
//! One system table, created on first use:
//! row = base table name, family `meta`, column = index name,
//! value = encoded `IndexDefinition`.

use crate::builder::IndexBuilder;
use crate::codec::{decode_document, encode_document, DocumentCodec, JsonCodec};
use crate::config::IndexConfig;
use crate::definition::IndexDefinition;
use crate::error::{Error, Result};
use crate::store::Store;
use std::sync::Arc;
use tracing::debug;

pub const METADATA_FAMILY: &str = "meta";

pub struct IndexMetadataStore {
    store: Arc<dyn Store>,
    table: String,
    codec: Arc<dyn DocumentCodec>,
    track_cardinality: bool,
}

impl IndexMetadataStore {
    pub fn new(store: Arc<dyn Store>, config: &IndexConfig) -> Self {
        Self::with_codec(store, config, Arc::new(JsonCodec))
    }

    pub fn with_codec(store: Arc<dyn Store>, config: &IndexConfig, codec: Arc<dyn DocumentCodec>) -> Self {
        Self {
            store,
            table: config.metadata_table.clone(),
            codec,
            track_cardinality: config.track_cardinality,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Stored definitions for `base`, ordered by index name.
    /// No metadata table yet means no indexes.
    pub fn definitions(&self, base: &str) -> Result<Vec<IndexDefinition>> {
        if !self.store.table_exists(&self.table) {
            return Ok(Vec::new());
        }
        let table = self.store.open_table(&self.table)?;
        let cells = table.get(base.as_bytes(), METADATA_FAMILY, &[])?;
        cells
            .values()
            .map(|cell| decode_document(self.codec.as_ref(), &cell.value))
            .collect()
    }

    /// Builders for every index of `base`, bound to their backing tables
    pub fn load(&self, base: &str) -> Result<Vec<IndexBuilder>> {
        self.definitions(base)?
            .into_iter()
            .map(|def| IndexBuilder::open(self.store.as_ref(), def, self.track_cardinality))
            .collect()
    }

    /// Encoded form of a definition, as stored
    pub fn encode(&self, definition: &IndexDefinition) -> Result<Vec<u8>> {
        encode_document(self.codec.as_ref(), definition)
    }

    pub fn add(&self, base: &str, definition: &IndexDefinition) -> Result<()> {
        let encoded = self.encode(definition)?;
        self.add_encoded(base, definition.name(), &encoded)
    }

    /// Store an already encoded definition under `name`
    pub fn add_encoded(&self, base: &str, name: &str, encoded: &[u8]) -> Result<()> {
        self.ensure_table()?;
        let table = self.store.open_table(&self.table)?;
        table.put(base.as_bytes(), METADATA_FAMILY, name.as_bytes(), encoded, None)?;
        debug!(base, index = name, "index metadata stored");
        Ok(())
    }

    /// Drop the entry for `name`; absent entries are fine
    pub fn remove(&self, base: &str, name: &str) -> Result<()> {
        if !self.store.table_exists(&self.table) {
            return Ok(());
        }
        let table = self.store.open_table(&self.table)?;
        table.delete(base.as_bytes(), METADATA_FAMILY, &[name.as_bytes()])?;
        debug!(base, index = name, "index metadata removed");
        Ok(())
    }

    /// Drop every entry of `base`
    pub fn remove_all(&self, base: &str) -> Result<()> {
        if !self.store.table_exists(&self.table) {
            return Ok(());
        }
        let table = self.store.open_table(&self.table)?;
        table.delete(base.as_bytes(), METADATA_FAMILY, &[])?;
        debug!(base, "index metadata cleared");
        Ok(())
    }

    fn ensure_table(&self) -> Result<()> {
        if self.store.table_exists(&self.table) {
            return Ok(());
        }
        match self.store.create_table(&self.table, &[METADATA_FAMILY]) {
            Ok(()) => {
                debug!(table = %self.table, "metadata table created");
                Ok(())
            }
            // Lost a creation race, table is there either way
            Err(Error::TableExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
