//! Tests for M5: Concurrent Writers and Registry Swaps
//!
//! Run with:
//! cargo test m5_concurrency -- --nocapture

use colindex::{IndexConfig, IndexDefinition, IndexedTable, MemoryStore, RowLockMode, Store, Table};
use std::sync::Arc;
use std::thread;

fn setup(mode: RowLockMode) -> (Arc<MemoryStore>, Arc<IndexedTable>) {
    let store = Arc::new(MemoryStore::new());
    store.create_table("employees", &["profile"]).unwrap();
    let config = IndexConfig::new(mode).lock_stripes(8);
    let table = IndexedTable::open_with_config(store.clone(), "employees", config).unwrap();
    table
        .create_index(IndexDefinition::new("byDept", "profile", ["dept"]).unwrap())
        .unwrap();
    (store, Arc::new(table))
}

fn index_matches_base(store: &MemoryStore, table: &IndexedTable) {
    let base = store.open_table("employees").unwrap();
    let rows = base.scan(b"", b"", "profile", &[b"dept".as_slice()]).unwrap();

    let mut expected = 0;
    for row in &rows {
        let dept = row.value("profile", b"dept").unwrap();
        let hits = table.lookup("byDept", &[dept]).unwrap();
        assert!(hits.contains(&row.row), "row {:?} missing under its dept", row.row);
        expected += 1;
    }

    let index = store.open_table("byDept").unwrap();
    let entries = index.scan(b"", b"", "entries", &[]).unwrap();
    assert_eq!(entries.len(), expected, "no stale entries left behind");
    assert_eq!(table.index("byDept").unwrap().cardinality().unwrap(), expected as i64);
}

#[test]
fn test_striped_writers_to_shared_rows_stay_consistent() {
    let (store, table) = setup(RowLockMode::Striped);
    let depts = ["eng", "ops", "sales", "hr"];

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..200 {
                    let row = format!("e{}", i % 10);
                    let dept = depts[(t + i) % depts.len()];
                    table.put(row.as_bytes(), "profile", b"dept", dept.as_bytes(), None).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    index_matches_base(&store, &table);
}

#[test]
fn test_disjoint_rows_without_locks() {
    let (store, table) = setup(RowLockMode::Disabled);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..100 {
                    let row = format!("t{t}-r{i}");
                    let dept = if i % 2 == 0 { "even" } else { "odd" };
                    table.put(row.as_bytes(), "profile", b"dept", dept.as_bytes(), None).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    index_matches_base(&store, &table);
    assert_eq!(table.lookup("byDept", &[b"even"]).unwrap().len(), 200);
}

#[test]
fn test_registry_swaps_under_traffic() {
    let (_store, table) = setup(RowLockMode::Disabled);

    let writer = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            for i in 0..300 {
                let row = format!("w{i}");
                table.put(row.as_bytes(), "profile", b"city", b"oslo", None).unwrap();
            }
        })
    };

    for _ in 0..5 {
        table
            .create_index(IndexDefinition::new("byCity", "profile", ["city"]).unwrap())
            .unwrap();
        assert_eq!(table.indexes().len(), 2);
        table.drop_index("byCity").unwrap();
        assert_eq!(table.indexes().len(), 1);
    }

    writer.join().unwrap();
    assert_eq!(table.scan(b"", b"", "profile", &[]).unwrap().len(), 300);
}
