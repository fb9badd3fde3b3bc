//! Row snapshots.
//!
//! A `RowMap` is the in-memory view of a row's covered columns at one point of
//! a mutation: captured before the write, then cloned and overlaid with the
//! written values to get the after-image. It is never persisted.

use crate::types::{Column, FamilyMap, Qualifier};
use std::collections::BTreeMap;

/// family -> qualifier -> value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowMap {
    families: BTreeMap<String, BTreeMap<Qualifier, Vec<u8>>>,
}

impl RowMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one family as read from the store
    pub fn from_family(family: &str, columns: FamilyMap) -> Self {
        let mut map = Self::new();
        if !columns.is_empty() {
            map.families.insert(
                family.to_string(),
                columns.into_iter().map(|(q, cell)| (q, cell.value)).collect(),
            );
        }
        map
    }

    pub fn insert(&mut self, family: &str, qualifier: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.families
            .entry(family.to_string())
            .or_default()
            .insert(qualifier.into(), value.into());
    }

    pub fn remove(&mut self, family: &str, qualifier: &[u8]) {
        if let Some(columns) = self.families.get_mut(family) {
            columns.remove(qualifier);
            if columns.is_empty() {
                self.families.remove(family);
            }
        }
    }

    pub fn remove_family(&mut self, family: &str) {
        self.families.remove(family);
    }

    pub fn get(&self, family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.families
            .get(family)
            .and_then(|columns| columns.get(qualifier))
            .map(Vec::as_slice)
    }

    pub fn family(&self, family: &str) -> Option<&BTreeMap<Qualifier, Vec<u8>>> {
        self.families.get(family)
    }

    /// Clone with `columns` written over `family`
    pub fn overlay(&self, family: &str, columns: &[Column]) -> RowMap {
        let mut next = self.clone();
        for column in columns {
            next.insert(family, column.qualifier.clone(), column.value.clone());
        }
        next
    }

    /// Clone with `qualifiers` removed from `family` (the whole family if empty)
    pub fn without(&self, family: &str, qualifiers: &[&[u8]]) -> RowMap {
        let mut next = self.clone();
        if qualifiers.is_empty() {
            next.remove_family(family);
        } else {
            for q in qualifiers {
                next.remove(family, q);
            }
        }
        next
    }

    /// Values of `qualifiers` in order, or None if any of them is absent
    pub fn values_for<'a>(&'a self, family: &str, qualifiers: &[Qualifier]) -> Option<Vec<&'a [u8]>> {
        let columns = self.families.get(family)?;
        qualifiers
            .iter()
            .map(|q| columns.get(q).map(Vec::as_slice))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}
