//! Cursor behavior: full traversal, lazy values, deletion of the
//! entry most recently returned.

use std::collections::HashMap;

use vaultkv::{Table, TableConfig, VaultError};

fn small_table() -> Table {
    Table::new(TableConfig {
        capacity: 8,
        ..TableConfig::default()
    })
    .unwrap()
}

// =============================================================================
// Traversal
// =============================================================================

#[test]
fn iteration_yields_every_pair_exactly_once() {
    let t = small_table();
    let expected: HashMap<u64, Vec<u8>> = [12312u64, 23423, 6166, 182638]
        .iter()
        .map(|k| (*k, k.to_be_bytes().to_vec()))
        .collect();
    for (k, v) in &expected {
        t.set(*k, Some(v)).unwrap();
    }

    let mut seen = HashMap::new();
    for entry in t.iter() {
        let value = entry.value().unwrap().to_vec();
        assert!(seen.insert(entry.key(), value).is_none(), "duplicate key");
    }
    assert_eq!(seen, expected);
}

#[test]
fn empty_table_iterates_nothing() {
    let t = small_table();
    assert_eq!(t.iter().count(), 0);
}

#[test]
fn deleting_the_returned_entry_is_safe() {
    let t = small_table();
    let keys = [12312u64, 23423, 6166, 182638];
    for k in keys {
        t.set(k, Some(&k.to_be_bytes())).unwrap();
    }

    // delete two entries through the table while iterating
    let mut deleted = 0;
    let mut visited = 0;
    for entry in t.iter() {
        visited += 1;
        if deleted < 2 {
            assert!(t.delete(entry.key()).unwrap());
            deleted += 1;
        }
    }
    assert_eq!(visited, 4);
    assert_eq!(t.size(), 2);
}

// =============================================================================
// Lazy values
// =============================================================================

#[test]
fn value_is_fetched_on_demand() {
    let t = small_table();
    t.set_compression_threshold(0);
    let payload = vec![0x5Au8; 2048];
    t.set(1, Some(&payload)).unwrap();

    let entry = t.iter().next().unwrap();
    assert_eq!(entry.key(), 1);
    assert_eq!(&entry.value().unwrap()[..], &payload[..]);
    // a second fetch works too
    assert_eq!(entry.value().unwrap().len(), 2048);
}

#[test]
fn value_of_a_deleted_entry_errors() {
    let t = small_table();
    t.set(1, Some(b"v")).unwrap();
    let entry = t.iter().next().unwrap();
    t.delete(1).unwrap();
    assert!(matches!(
        entry.value().unwrap_err(),
        VaultError::IllegalState(_)
    ));
}

#[test]
fn unsupported_concurrent_deletion_ends_iteration() {
    let t = small_table();
    for k in 0..8u64 {
        t.set(k, Some(b"v")).unwrap();
    }
    let mut it = t.iter();
    let first = it.next().unwrap();
    // deleting entries the cursor has not reached may invalidate its
    // pre-fetched position; the cursor must stop, not misbehave
    for k in 0..8u64 {
        if k != first.key() {
            t.delete(k).unwrap();
        }
    }
    let remaining: Vec<u64> = it.map(|e| e.key()).collect();
    assert!(remaining.is_empty());
}
