//! Index definitions and covering logic.
//!
//! An `IndexDefinition` watches one column family. Its key columns, in order,
//! form the index key; optional include columns are carried along so that
//! mutating them also triggers maintenance. Key columns plus include columns
//! make up the covered set.

use crate::error::{Error, Result};
use crate::types::Qualifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted shape of a definition
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefinitionDoc {
    name: String,
    family: String,
    columns: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    unique: bool,
}

/// Immutable description of one secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionDoc", into = "DefinitionDoc")]
pub struct IndexDefinition {
    name: String,
    family: String,
    columns: Vec<String>,
    include: Vec<String>,
    unique: bool,
    /// `columns` as raw qualifiers, key order
    key_qualifiers: Vec<Qualifier>,
    covered: BTreeSet<Qualifier>,
}

impl IndexDefinition {
    /// Non-unique index on `columns` of `family`
    pub fn new<I, S>(name: &str, family: &str, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(DefinitionDoc {
            name: name.to_string(),
            family: family.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            include: Vec::new(),
            unique: false,
        })
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Extra covered columns that are not part of the key
    pub fn include<I, S>(self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut doc = DefinitionDoc::from(self);
        doc.include.extend(columns.into_iter().map(Into::into));
        Self::build(doc)
    }

    fn build(doc: DefinitionDoc) -> Result<Self> {
        if doc.name.trim().is_empty() {
            return Err(Error::validation("index name must not be empty"));
        }
        if doc.family.is_empty() {
            return Err(Error::validation(format!(
                "index '{}' must name a column family",
                doc.name
            )));
        }
        if doc.columns.is_empty() {
            return Err(Error::validation(format!(
                "index '{}' covers no columns",
                doc.name
            )));
        }

        let mut covered = BTreeSet::new();
        for column in doc.columns.iter().chain(doc.include.iter()) {
            if column.is_empty() {
                return Err(Error::validation(format!(
                    "index '{}' has an empty column qualifier",
                    doc.name
                )));
            }
            if !covered.insert(column.as_bytes().to_vec()) {
                return Err(Error::validation(format!(
                    "index '{}' lists column '{column}' twice",
                    doc.name
                )));
            }
        }

        Ok(Self {
            key_qualifiers: doc.columns.iter().map(|c| c.as_bytes().to_vec()).collect(),
            covered,
            name: doc.name,
            family: doc.family,
            columns: doc.columns,
            include: doc.include,
            unique: doc.unique,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Key columns in key order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn include_columns(&self) -> &[String] {
        &self.include
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Name of the backing index table
    pub fn table_name(&self) -> &str {
        &self.name
    }

    pub fn key_qualifiers(&self) -> &[Qualifier] {
        &self.key_qualifiers
    }

    pub fn covered_qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.covered
    }

    /// Whether a mutation of `qualifiers` in `family` needs this index maintained.
    /// An empty qualifier list stands for the whole family.
    pub fn cover(&self, family: &str, qualifiers: &[&[u8]]) -> bool {
        family == self.family
            && (qualifiers.is_empty() || qualifiers.iter().any(|q| self.covered.contains(*q)))
    }

    /// Columns to snapshot around such a mutation: every covered column when
    /// the mutation touches this index, nothing otherwise.
    pub fn find_covered_columns(&self, family: &str, qualifiers: &[&[u8]]) -> BTreeSet<Qualifier> {
        if self.cover(family, qualifiers) {
            self.covered.clone()
        } else {
            BTreeSet::new()
        }
    }

    pub fn cover_same_columns(&self, other: &IndexDefinition) -> bool {
        self.covered == other.covered
    }
}

impl TryFrom<DefinitionDoc> for IndexDefinition {
    type Error = Error;

    fn try_from(doc: DefinitionDoc) -> Result<Self> {
        Self::build(doc)
    }
}

impl From<IndexDefinition> for DefinitionDoc {
    fn from(def: IndexDefinition) -> Self {
        Self {
            name: def.name,
            family: def.family,
            columns: def.columns,
            include: def.include,
            unique: def.unique,
        }
    }
}
