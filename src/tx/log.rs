//! Redo log internals
//!
//! `TxCore` is the lock-protected state behind a [`Transaction`] handle.
//! Lock order is always transaction log first, then one map core at a
//! time; table operations never hold their core lock while appending to
//! the log.
//!
//! [`Transaction`]: crate::tx::Transaction

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::arena::EntryRef;
use crate::config::TransactionMode;
use crate::error::{Result, VaultError};
use crate::map::core::MapCore;

/// Staged changes between warnings about transaction growth.
const GROWTH_WARN_INTERVAL: usize = 1024;

/// One staged mutation. Insert, update, and delete are distinguished by
/// which side is `None`; both entries stay allocated until commit or
/// rollback decides their fate.
pub(crate) struct LogRecord {
    pub core: Arc<Mutex<MapCore>>,
    pub old: Option<EntryRef>,
    pub new: Option<EntryRef>,
}

pub(crate) struct TxCore {
    pub mode: TransactionMode,
    pub log: Vec<LogRecord>,
    /// Position of the single-slot safepoint. Zero means "start of the
    /// transaction window".
    pub simple_safepoint: usize,
    /// Reference the next commit will carry.
    pub current_ref: i64,
    pub last_committed_ref: i64,
    /// Reference of the last delta replayed into views; trails
    /// `last_committed_ref` while a delayed commit is outstanding.
    pub last_committed_ref_on_views: i64,
    pub closed: bool,
}

impl TxCore {
    pub fn new(mode: TransactionMode) -> Self {
        Self {
            mode,
            log: Vec::new(),
            simple_safepoint: 0,
            // the first window's ref must differ from the initial
            // committed refs, or the delayed-replay guard cannot fire
            current_ref: 1,
            last_committed_ref: 0,
            last_committed_ref_on_views: 0,
            closed: false,
        }
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(VaultError::IllegalState(
                "operation on a closed transaction".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_no_pending(&self, what: &str) -> Result<()> {
        if !self.log.is_empty() {
            return Err(VaultError::IllegalState(format!(
                "{} with {} uncommitted changes pending",
                what,
                self.log.len()
            )));
        }
        Ok(())
    }

    /// Append a staged mutation, warning periodically about very large
    /// transactions.
    pub fn push(&mut self, record: LogRecord) {
        self.log.push(record);
        if self.log.len() % GROWTH_WARN_INTERVAL == 0 {
            warn!(
                staged = self.log.len(),
                "open transaction keeps growing; commit or roll back"
            );
        }
    }

    /// Replay a slice of records into their cores, stamping each core
    /// with the commit reference. Used by commit and by delayed view
    /// replay.
    pub fn replay_records(records: &[LogRecord], commit_ref: i64) -> Result<usize> {
        for rec in records {
            let mut core = rec.core.lock();
            core.replay(rec.old, rec.new)?;
            core.last_committed_ref = commit_ref;
        }
        Ok(records.len())
    }

    /// Undo staged records from the tail down to (but excluding)
    /// position `keep`, returning how many were undone.
    pub fn rollback_to(&mut self, keep: usize) -> Result<usize> {
        let undone = self.log.len() - keep;
        while self.log.len() > keep {
            let rec = self.log.pop().ok_or_else(|| {
                VaultError::IllegalState("redo log shrank during rollback".to_string())
            })?;
            rec.core.lock().undo(rec.old, rec.new)?;
        }
        if self.simple_safepoint > keep {
            // a rollback past the simple safepoint invalidates it
            self.simple_safepoint = keep;
        }
        debug!(undone, remaining = keep, "rolled back staged changes");
        Ok(undone)
    }
}
