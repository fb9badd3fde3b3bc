use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row keys and qualifiers are raw bytes
pub type RowKey = Vec<u8>;
pub type Qualifier = Vec<u8>;

/// qualifier -> cell, ordered by qualifier bytes
pub type FamilyMap = BTreeMap<Qualifier, Cell>;

/// A stored cell: value plus write timestamp (millis)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Vec<u8>,
    pub timestamp: u64,
}

impl Cell {
    pub fn new(value: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        Self { value: value.into(), timestamp }
    }
}

/// One column of a multi-column put
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub qualifier: Qualifier,
    pub value: Vec<u8>,
    /// None = let the store stamp it
    pub timestamp: Option<u64>,
}

impl Column {
    pub fn new(qualifier: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            qualifier: qualifier.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A row returned by a scan: family name -> columns
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowResult {
    pub row: RowKey,
    pub families: BTreeMap<String, FamilyMap>,
}

impl RowResult {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            families: BTreeMap::new(),
        }
    }

    /// Cell value for family/qualifier, if present
    pub fn value(&self, family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.families
            .get(family)
            .and_then(|cols| cols.get(qualifier))
            .map(|cell| cell.value.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.families.values().all(|cols| cols.is_empty())
    }
}
