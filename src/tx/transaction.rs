//! Transaction handle
//!
//! Commit and rollback close the current transaction window and
//! immediately open the next one; there is no explicit "begin" beyond
//! optionally seeding the commit reference.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::TransactionMode;
use crate::error::{Result, VaultError};
use crate::tx::log::{LogRecord, TxCore};

/// Commit references advance by this much per committed window.
const REF_INCREMENT: i64 = 1;

/// A finalized but not yet replayed delta, produced by
/// [`Transaction::commit_delayed_update`].
///
/// Must be handed to [`Transaction::update_views`] exactly once, in
/// commit order. Dropping one unapplied leaks its replaced entries and
/// permanently fails the sequence check for every later delta.
pub struct DeltaHandle {
    pub(crate) predecessor_ref: i64,
    pub(crate) commit_ref: i64,
    pub(crate) records: Vec<LogRecord>,
}

impl DeltaHandle {
    /// Number of staged changes carried by this delta.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Caller-managed rollback marker, nestable. See
/// [`Transaction::define_safepoint`].
#[derive(Debug, Clone, Copy)]
pub struct Safepoint {
    pos: usize,
}

/// Per-shard transaction: stages mutations of every structure bound to
/// its shard, and commits or rolls them back as one unit.
#[derive(Clone)]
pub struct Transaction {
    core: Arc<Mutex<TxCore>>,
}

impl Transaction {
    pub fn new(mode: TransactionMode) -> Self {
        Self {
            core: Arc::new(Mutex::new(TxCore::new(mode))),
        }
    }

    pub(crate) fn core(&self) -> Arc<Mutex<TxCore>> {
        self.core.clone()
    }

    pub fn mode(&self) -> TransactionMode {
        self.core.lock().mode
    }

    /// Number of uncommitted staged changes.
    pub fn pending_changes(&self) -> usize {
        self.core.lock().log.len()
    }

    pub fn last_committed_ref(&self) -> i64 {
        self.core.lock().last_committed_ref
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Commit the current window: replay every staged change into bound
    /// committed views (structures without views just retire their
    /// replaced entries) and return the number of rows changed.
    ///
    /// Errors if an earlier delayed commit has not been replayed yet.
    pub fn commit(&self) -> Result<usize> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        if tx.log.is_empty() {
            return Ok(0);
        }
        if tx.last_committed_ref != tx.last_committed_ref_on_views {
            return Err(VaultError::IllegalState(
                "cannot commit: a delayed commit has not been replayed into the views".to_string(),
            ));
        }
        let commit_ref = tx.current_ref;
        let rows = TxCore::replay_records(&tx.log, commit_ref)?;
        tx.log.clear();
        tx.simple_safepoint = 0;
        tx.last_committed_ref = commit_ref;
        tx.last_committed_ref_on_views = commit_ref;
        tx.current_ref += REF_INCREMENT;
        info!(rows, commit_ref, "transaction committed");
        Ok(rows)
    }

    /// Finalize the current window but defer view replay. Returns `None`
    /// when nothing was staged. The returned delta must later be passed
    /// to [`update_views`](Self::update_views), in commit order.
    pub fn commit_delayed_update(&self) -> Result<Option<DeltaHandle>> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        if tx.log.is_empty() {
            return Ok(None);
        }
        let handle = DeltaHandle {
            predecessor_ref: tx.last_committed_ref,
            commit_ref: tx.current_ref,
            records: std::mem::take(&mut tx.log),
        };
        tx.simple_safepoint = 0;
        tx.last_committed_ref = handle.commit_ref;
        tx.current_ref += REF_INCREMENT;
        debug!(
            rows = handle.records.len(),
            commit_ref = handle.commit_ref,
            "transaction committed with delayed view update"
        );
        Ok(Some(handle))
    }

    /// Replay a delayed delta into the committed views. Deltas must
    /// arrive in commit order; a gap or swap is rejected and leaves the
    /// views untouched.
    pub fn update_views(&self, handle: DeltaHandle) -> Result<usize> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        if handle.predecessor_ref != tx.last_committed_ref_on_views {
            return Err(VaultError::IllegalState(format!(
                "out-of-order view replay: delta follows commit {} but views are at {}",
                handle.predecessor_ref, tx.last_committed_ref_on_views
            )));
        }
        let rows = TxCore::replay_records(&handle.records, handle.commit_ref)?;
        tx.last_committed_ref_on_views = handle.commit_ref;
        debug!(rows, commit_ref = handle.commit_ref, "views updated");
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Rollback and safepoints
    // -------------------------------------------------------------------------

    /// Undo every staged change of the current window, restoring the
    /// exact prior entries. Requires a transactional mode.
    pub fn rollback(&self) -> Result<()> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        Self::ensure_transactional(&tx)?;
        tx.rollback_to(0)?;
        Ok(())
    }

    /// Mark the single-slot safepoint at the current position; returns
    /// the number of changes staged so far.
    pub fn set_safepoint(&self) -> Result<usize> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        Self::ensure_transactional(&tx)?;
        tx.simple_safepoint = tx.log.len();
        Ok(tx.simple_safepoint)
    }

    /// Undo back to the single-slot safepoint (or the start of the
    /// window if none was set); returns the number of changes undone.
    pub fn rollback_to_safepoint(&self) -> Result<usize> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        Self::ensure_transactional(&tx)?;
        let keep = tx.simple_safepoint;
        tx.rollback_to(keep)
    }

    /// A nestable safepoint token for the current position.
    pub fn define_safepoint(&self) -> Result<Safepoint> {
        let tx = self.core.lock();
        tx.ensure_open()?;
        Self::ensure_transactional(&tx)?;
        Ok(Safepoint { pos: tx.log.len() })
    }

    /// Undo back to a token from [`define_safepoint`]. Rolling back past
    /// the single-slot safepoint invalidates it.
    ///
    /// [`define_safepoint`]: Self::define_safepoint
    pub fn rollback_to_defined_safepoint(&self, sp: Safepoint) -> Result<usize> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        Self::ensure_transactional(&tx)?;
        if sp.pos > tx.log.len() {
            return Err(VaultError::IllegalState(
                "safepoint is ahead of the current redo log position".to_string(),
            ));
        }
        tx.rollback_to(sp.pos)
    }

    // -------------------------------------------------------------------------
    // Window control
    // -------------------------------------------------------------------------

    /// Seed the commit reference for the next window. Only legal with no
    /// pending changes.
    pub fn begin(&self, commit_ref: i64) -> Result<()> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        tx.ensure_no_pending("begin")?;
        tx.current_ref = commit_ref;
        Ok(())
    }

    /// Change the transaction mode between windows. Only legal with no
    /// pending changes.
    pub fn set_mode(&self, mode: TransactionMode) -> Result<()> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        tx.ensure_no_pending("set_mode")?;
        tx.mode = mode;
        Ok(())
    }

    /// Terminal. Errors while changes are pending; afterwards every
    /// operation on this transaction reports an illegal state.
    pub fn close(self) -> Result<()> {
        let mut tx = self.core.lock();
        tx.ensure_open()?;
        tx.ensure_no_pending("close")?;
        tx.closed = true;
        Ok(())
    }

    fn ensure_transactional(tx: &TxCore) -> Result<()> {
        if !tx.mode.transactional {
            return Err(VaultError::IllegalState(
                "rollback and safepoints require a transactional mode".to_string(),
            ));
        }
        Ok(())
    }
}
