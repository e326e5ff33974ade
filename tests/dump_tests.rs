//! Dump/restore: round-trip fidelity, integrity checks, view seeding.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use vaultkv::{
    Shard, Table, TableConfig, Transaction, TransactionMode, VaultError,
};

fn dump_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

/// Table with compressed, uncompressed, and empty entries.
fn populated_table() -> Table {
    let t = Table::new(TableConfig::default()).unwrap();
    t.set_compression_threshold(64);
    t.set(1, Some(&[0xAAu8; 1024])).unwrap(); // compresses
    t.set(2, Some(b"short")).unwrap(); // stays raw
    t.set(3, Some(b"")).unwrap(); // empty
    t
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn dump_and_restore_preserve_logical_content() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "table.vkdv");

    let src = populated_table();
    assert!(src.compressed_length(1).unwrap().unwrap() > 0);
    src.write_to_file(&path).unwrap();

    let dst = Table::new(TableConfig::default()).unwrap();
    assert_eq!(dst.read_from_file(&path).unwrap(), 3);
    assert_eq!(dst.size(), 3);
    assert_eq!(dst.get(1).unwrap().as_deref(), Some(&[0xAAu8; 1024][..]));
    assert_eq!(dst.get(2).unwrap().as_deref(), Some(&b"short"[..]));
    assert_eq!(dst.get(3).unwrap().as_deref(), Some(&b""[..]));

    // entries keep their stored form across the round trip
    assert_eq!(
        dst.compressed_length(1).unwrap(),
        src.compressed_length(1).unwrap()
    );
    assert_eq!(dst.compressed_length(2).unwrap(), Some(0));
}

#[test]
fn empty_table_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "empty.vkdv");

    let src = Table::new(TableConfig::default()).unwrap();
    src.write_to_file(&path).unwrap();

    let dst = Table::new(TableConfig::default()).unwrap();
    assert_eq!(dst.read_from_file(&path).unwrap(), 0);
    assert!(dst.is_empty());
}

#[test]
fn restore_works_across_capacities() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "resize.vkdv");

    let src = Table::new(TableConfig {
        capacity: 32,
        ..TableConfig::default()
    })
    .unwrap();
    for k in 0..100u64 {
        src.set(k, Some(&k.to_le_bytes())).unwrap();
    }
    src.write_to_file(&path).unwrap();

    let dst = Table::new(TableConfig {
        capacity: 1024,
        ..TableConfig::default()
    })
    .unwrap();
    assert_eq!(dst.read_from_file(&path).unwrap(), 100);
    for k in 0..100u64 {
        assert_eq!(dst.get(k).unwrap().as_deref(), Some(&k.to_le_bytes()[..]));
    }
}

// =============================================================================
// Preconditions and integrity
// =============================================================================

#[test]
fn restore_into_a_non_empty_table_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "table.vkdv");
    populated_table().write_to_file(&path).unwrap();

    let dst = Table::new(TableConfig::default()).unwrap();
    dst.set(42, Some(b"occupied")).unwrap();
    assert!(matches!(
        dst.read_from_file(&path).unwrap_err(),
        VaultError::IllegalState(_)
    ));
}

#[test]
fn corrupted_dump_is_detected() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "table.vkdv");
    populated_table().write_to_file(&path).unwrap();

    // flip one byte in the middle of the file
    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let dst = Table::new(TableConfig::default()).unwrap();
    assert!(matches!(
        dst.read_from_file(&path).unwrap_err(),
        VaultError::Corrupt(_)
    ));
    assert!(dst.is_empty());
}

#[test]
fn truncated_and_garbage_files_are_detected() {
    let dir = TempDir::new().unwrap();

    let short = dump_path(&dir, "short.vkdv");
    fs::write(&short, [1u8, 2]).unwrap();
    let dst = Table::new(TableConfig::default()).unwrap();
    assert!(matches!(
        dst.read_from_file(&short).unwrap_err(),
        VaultError::Corrupt(_)
    ));

    let garbage = dump_path(&dir, "garbage.vkdv");
    let mut bytes = vec![0u8; 64];
    let crc = crc32fast::hash(&bytes[..60]);
    bytes[60..].copy_from_slice(&crc.to_le_bytes());
    fs::write(&garbage, &bytes).unwrap();
    // checksum passes but the magic is wrong
    assert!(matches!(
        dst.read_from_file(&garbage).unwrap_err(),
        VaultError::Corrupt(_)
    ));
}

#[test]
fn missing_file_reports_io() {
    let dir = TempDir::new().unwrap();
    let dst = Table::new(TableConfig::default()).unwrap();
    assert!(matches!(
        dst.read_from_file(&dump_path(&dir, "missing.vkdv"))
            .unwrap_err(),
        VaultError::Io(_)
    ));
}

// =============================================================================
// Views
// =============================================================================

#[test]
fn restore_seeds_the_committed_view() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "table.vkdv");
    populated_table().write_to_file(&path).unwrap();

    let shard = Shard::new();
    let tx = Transaction::new(TransactionMode::transactional());
    shard.set_owning_transaction(&tx).unwrap();
    let dst = Table::new(TableConfig {
        committed_view: true,
        shard,
        ..TableConfig::default()
    })
    .unwrap();
    dst.read_from_file(&path).unwrap();

    let view = dst.view().unwrap();
    assert_eq!(view.size(), 3);
    assert_eq!(view.get(2).unwrap().as_deref(), Some(&b"short"[..]));

    // restored state behaves like committed state: a staged overwrite
    // keeps the old value visible in the view until commit
    dst.set(2, Some(b"changed")).unwrap();
    assert_eq!(view.get(2).unwrap().as_deref(), Some(&b"short"[..]));
    tx.commit().unwrap();
    assert_eq!(view.get(2).unwrap().as_deref(), Some(&b"changed"[..]));
}

#[test]
fn view_dump_captures_committed_state_only() {
    let dir = TempDir::new().unwrap();
    let path = dump_path(&dir, "view.vkdv");

    let shard = Shard::new();
    let tx = Transaction::new(TransactionMode::transactional());
    shard.set_owning_transaction(&tx).unwrap();
    let t = Table::new(TableConfig {
        committed_view: true,
        shard,
        ..TableConfig::default()
    })
    .unwrap();

    t.set(1, Some(b"committed")).unwrap();
    tx.commit().unwrap();
    t.set(2, Some(b"staged")).unwrap();

    t.view().unwrap().write_to_file(&path).unwrap();
    tx.rollback().unwrap();

    let dst = Table::new(TableConfig::default()).unwrap();
    assert_eq!(dst.read_from_file(&path).unwrap(), 1);
    assert_eq!(dst.get(1).unwrap().as_deref(), Some(&b"committed"[..]));
    assert_eq!(dst.get(2).unwrap(), None);
}
