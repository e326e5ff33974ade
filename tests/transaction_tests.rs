//! Transaction semantics: staging, commit, rollback, safepoints, and
//! window control.

use vaultkv::{
    RedoLogMode, Shard, Table, TableConfig, Transaction, TransactionMode, VaultError,
};

fn tx_table() -> (Table, Transaction) {
    let shard = Shard::new();
    let tx = Transaction::new(TransactionMode::transactional());
    shard.set_owning_transaction(&tx).unwrap();
    let table = Table::new(TableConfig {
        shard,
        ..TableConfig::default()
    })
    .unwrap();
    (table, tx)
}

// =============================================================================
// Staging and commit
// =============================================================================

#[test]
fn staged_writes_are_visible_immediately() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    assert_eq!(t.get(1).unwrap().as_deref(), Some(&b"a"[..]));
    assert_eq!(tx.pending_changes(), 1);
    assert_eq!(tx.commit().unwrap(), 1);
    assert_eq!(tx.pending_changes(), 0);
    assert_eq!(t.get(1).unwrap().as_deref(), Some(&b"a"[..]));
}

#[test]
fn commit_returns_rows_changed_and_opens_next_window() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    t.set(2, Some(b"b")).unwrap();
    t.delete(3).unwrap(); // absent, stages nothing
    assert_eq!(tx.commit().unwrap(), 2);

    // next window works the same
    t.set(3, Some(b"c")).unwrap();
    assert_eq!(tx.commit().unwrap(), 1);
    assert_eq!(t.size(), 3);
}

#[test]
fn commit_with_nothing_staged_is_a_noop() {
    let (_t, tx) = tx_table();
    assert_eq!(tx.commit().unwrap(), 0);
}

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn rollback_restores_exact_prior_state() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"committed-1")).unwrap();
    t.set(2, Some(b"committed-2")).unwrap();
    tx.commit().unwrap();

    // stage an update, an insert, and a delete
    t.set(1, Some(b"dirty")).unwrap();
    t.set(3, Some(b"new")).unwrap();
    t.delete(2).unwrap();
    assert_eq!(tx.pending_changes(), 3);

    tx.rollback().unwrap();
    assert_eq!(tx.pending_changes(), 0);
    assert_eq!(t.get(1).unwrap().as_deref(), Some(&b"committed-1"[..]));
    assert_eq!(t.get(2).unwrap().as_deref(), Some(&b"committed-2"[..]));
    assert_eq!(t.get(3).unwrap(), None);
    assert_eq!(t.size(), 2);
}

#[test]
fn clear_is_fully_rolled_back() {
    let (t, tx) = tx_table();
    for k in 0..20 {
        t.set(k, Some(&[k as u8])).unwrap();
    }
    tx.commit().unwrap();

    t.clear().unwrap();
    assert!(t.is_empty());
    assert_eq!(tx.pending_changes(), 20);

    tx.rollback().unwrap();
    assert_eq!(t.size(), 20);
    for k in 0..20 {
        assert_eq!(t.get(k).unwrap().as_deref(), Some(&[k as u8][..]));
    }
}

#[test]
fn rollback_requires_transactional_mode() {
    let shard = Shard::new();
    let tx = Transaction::new(TransactionMode {
        transactional: false,
        redo_log: RedoLogMode::Async,
    });
    shard.set_owning_transaction(&tx).unwrap();
    let t = Table::new(TableConfig {
        shard,
        ..TableConfig::default()
    })
    .unwrap();

    // redo-log-only mode still stages
    t.set(1, Some(b"a")).unwrap();
    assert_eq!(tx.pending_changes(), 1);
    assert!(matches!(
        tx.rollback().unwrap_err(),
        VaultError::IllegalState(_)
    ));
    tx.commit().unwrap();
}

#[test]
fn autonomous_mode_stages_nothing() {
    let shard = Shard::new();
    let tx = Transaction::new(TransactionMode::default());
    shard.set_owning_transaction(&tx).unwrap();
    let t = Table::new(TableConfig {
        shard,
        ..TableConfig::default()
    })
    .unwrap();

    t.set(1, Some(b"a")).unwrap();
    assert_eq!(tx.pending_changes(), 0);
    assert_eq!(t.get(1).unwrap().as_deref(), Some(&b"a"[..]));
}

// =============================================================================
// Safepoints
// =============================================================================

#[test]
fn safepoint_scenario() {
    let (t, tx) = tx_table();
    const K: u64 = 77;

    t.set(K, Some(b"b1")).unwrap();
    tx.set_safepoint().unwrap();
    t.set(K, Some(b"b2")).unwrap();
    assert_eq!(t.get(K).unwrap().as_deref(), Some(&b"b2"[..]));

    tx.rollback_to_safepoint().unwrap();
    assert_eq!(t.get(K).unwrap().as_deref(), Some(&b"b1"[..]));

    tx.rollback().unwrap();
    assert_eq!(t.get(K).unwrap(), None);
}

#[test]
fn set_safepoint_returns_change_count() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    t.set(2, Some(b"b")).unwrap();
    assert_eq!(tx.set_safepoint().unwrap(), 2);
}

#[test]
fn rollback_to_safepoint_without_one_undoes_everything() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    t.set(2, Some(b"b")).unwrap();
    assert_eq!(tx.rollback_to_safepoint().unwrap(), 2);
    assert!(t.is_empty());
}

#[test]
fn defined_safepoints_nest_and_invalidate_the_simple_one() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    let outer = tx.define_safepoint().unwrap();
    t.set(2, Some(b"b")).unwrap();
    tx.set_safepoint().unwrap();
    t.set(3, Some(b"c")).unwrap();

    // rolls back past the simple safepoint, invalidating it
    assert_eq!(tx.rollback_to_defined_safepoint(outer).unwrap(), 2);
    assert_eq!(t.get(2).unwrap(), None);
    assert_eq!(t.get(3).unwrap(), None);

    t.set(4, Some(b"d")).unwrap();
    // the simple safepoint now sits at the outer position
    assert_eq!(tx.rollback_to_safepoint().unwrap(), 1);
    assert_eq!(t.get(4).unwrap(), None);
    assert_eq!(t.get(1).unwrap().as_deref(), Some(&b"a"[..]));
}

#[test]
fn stale_defined_safepoint_is_rejected() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    let sp = tx.define_safepoint().unwrap();
    tx.rollback().unwrap();
    assert!(matches!(
        tx.rollback_to_defined_safepoint(sp).unwrap_err(),
        VaultError::IllegalState(_)
    ));
}

// =============================================================================
// Window control: begin, set_mode, close
// =============================================================================

#[test]
fn begin_and_set_mode_require_no_pending_changes() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();

    assert!(matches!(tx.begin(100).unwrap_err(), VaultError::IllegalState(_)));
    assert!(matches!(
        tx.set_mode(TransactionMode::default()).unwrap_err(),
        VaultError::IllegalState(_)
    ));

    tx.commit().unwrap();
    tx.begin(100).unwrap();
    tx.set_mode(TransactionMode::transactional()).unwrap();
}

#[test]
fn begin_seeds_the_commit_reference() {
    let (t, tx) = tx_table();
    tx.begin(500).unwrap();
    t.set(1, Some(b"a")).unwrap();
    tx.commit().unwrap();
    assert_eq!(tx.last_committed_ref(), 500);
}

#[test]
fn close_refuses_pending_changes_and_is_terminal() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    assert!(matches!(
        tx.clone().close().unwrap_err(),
        VaultError::IllegalState(_)
    ));
    tx.commit().unwrap();
    tx.clone().close().unwrap();
    assert!(matches!(tx.commit().unwrap_err(), VaultError::IllegalState(_)));
}

// =============================================================================
// Shards
// =============================================================================

#[test]
fn default_shard_cannot_be_reassigned() {
    let tx = Transaction::new(TransactionMode::transactional());
    let err = Shard::transactionless()
        .set_owning_transaction(&tx)
        .unwrap_err();
    assert!(matches!(err, VaultError::IllegalState(_)));
}

#[test]
fn shard_reassignment_requires_no_pending_changes() {
    let (t, tx) = tx_table();
    t.set(1, Some(b"a")).unwrap();
    let other = Shard::new();
    assert!(matches!(
        other.set_owning_transaction(&tx).unwrap_err(),
        VaultError::IllegalState(_)
    ));
    tx.commit().unwrap();
    other.set_owning_transaction(&tx).unwrap();
}
