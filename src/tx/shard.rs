//! Shards
//!
//! A shard groups tables and indexes that commit and roll back together.
//! Structures created on the process-wide transactionless shard never
//! stage anything; structures on an assignable shard stage through the
//! shard's owning transaction.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::WritePolicy;
use crate::error::{Result, VaultError};
use crate::tx::log::TxCore;
use crate::tx::Transaction;

static TRANSACTIONLESS: OnceLock<Shard> = OnceLock::new();

/// Cheap-clone handle tying structures to a transaction.
#[derive(Clone)]
pub struct Shard {
    inner: Arc<ShardInner>,
}

struct ShardInner {
    sentinel: bool,
    tx: Mutex<Option<Arc<Mutex<TxCore>>>>,
}

impl Shard {
    /// The process-wide default shard. Structures on it never
    /// participate in transactions, and it cannot be reassigned.
    pub fn transactionless() -> Shard {
        TRANSACTIONLESS
            .get_or_init(|| Shard {
                inner: Arc::new(ShardInner {
                    sentinel: true,
                    tx: Mutex::new(None),
                }),
            })
            .clone()
    }

    /// A fresh shard with no owning transaction yet.
    pub fn new() -> Shard {
        Shard {
            inner: Arc::new(ShardInner {
                sentinel: false,
                tx: Mutex::new(None),
            }),
        }
    }

    /// Assign the transaction whose log stages this shard's mutations.
    /// Rejected on the transactionless shard, and while the transaction
    /// has uncommitted changes.
    pub fn set_owning_transaction(&self, tx: &Transaction) -> Result<()> {
        if self.inner.sentinel {
            return Err(VaultError::IllegalState(
                "the transactionless default shard cannot be reassigned".to_string(),
            ));
        }
        let core = tx.core();
        {
            let guard = core.lock();
            guard.ensure_open()?;
            guard.ensure_no_pending("shard reassignment")?;
        }
        *self.inner.tx.lock() = Some(core);
        Ok(())
    }

    /// The owning transaction's log, if one is assigned.
    pub(crate) fn owning_tx(&self) -> Option<Arc<Mutex<TxCore>>> {
        self.inner.tx.lock().clone()
    }

    /// The log a structure with this write policy stages into right now:
    /// `None` for autonomous structures, unassigned shards, and
    /// transactions whose mode stages nothing.
    pub(crate) fn staging_tx(&self, policy: WritePolicy) -> Option<Arc<Mutex<TxCore>>> {
        if policy != WritePolicy::Transactional {
            return None;
        }
        let tx = self.owning_tx()?;
        let enabled = {
            let guard = tx.lock();
            !guard.closed && guard.mode.is_enabled()
        };
        enabled.then_some(tx)
    }
}

impl Default for Shard {
    fn default() -> Self {
        Shard::transactionless()
    }
}

// the transaction log behind the handle is not Debug; report the shard's
// identity-level state instead
impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("sentinel", &self.inner.sentinel)
            .field("has_transaction", &self.inner.tx.lock().is_some())
            .finish()
    }
}
