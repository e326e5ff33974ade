//! Configuration for VaultKV structures
//!
//! Every structure is configured at creation time through a plain struct
//! with named fields and documented defaults. Capacity, durability policy,
//! committed-view attachment, and index uniqueness are all fixed for the
//! structure's lifetime; only the compression threshold can be changed at
//! runtime (see [`Table::set_compression_threshold`]).
//!
//! [`Table::set_compression_threshold`]: crate::Table::set_compression_threshold

use crate::error::{Result, VaultError};
use crate::tx::Shard;

/// Default number of hash buckets for tables and indexes.
pub const DEFAULT_CAPACITY: usize = 4096;

/// How a table or index participates in transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Writes are staged in the shard's transaction (when one is attached
    /// and active). Required for rollback and committed views.
    #[default]
    Transactional,

    /// Writes apply immediately and are never logged, even when the shard
    /// has a transaction. No rollback, no committed view.
    Autonomous,
}

/// Uniqueness constraint of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Uniqueness {
    /// One index value maps to at most one primary key; violating creates
    /// fail with a duplicate-index error.
    Unique,

    /// One index value may map to many primary keys.
    #[default]
    NonUnique,
}

/// Redo-log durability flavor of a transaction.
///
/// The engine stages mutations in memory either way; the flavor records the
/// caller's intent for external replay and is reported back through
/// [`TransactionMode`]. With `Disabled` and `transactional == false` the
/// transaction is autonomous: writes apply immediately and cannot be rolled
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedoLogMode {
    #[default]
    Disabled,

    /// Changes may be replayed on another database, favoring speed.
    Async,

    /// Changes may be replayed on another database, favoring safety.
    Sync,
}

/// Mode of a transaction, fixed between transaction windows.
///
/// Replaces the original engine's ad hoc mode bitmasks with explicit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionMode {
    /// Allow rollback and safepoints; stage writes until commit.
    pub transactional: bool,

    /// Redo-log flavor for external replay.
    pub redo_log: RedoLogMode,
}

impl TransactionMode {
    /// Plain transactional mode: rollback/safepoints, no redo-log replay.
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            redo_log: RedoLogMode::Disabled,
        }
    }

    /// True if any staging is enabled. An all-off mode means writes apply
    /// immediately with no undo information kept.
    pub fn is_enabled(&self) -> bool {
        self.transactional || self.redo_log != RedoLogMode::Disabled
    }
}

/// Configuration for a [`Table`](crate::Table).
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Number of hash buckets, rounded up to a multiple of 32 at creation
    /// and fixed for the table's lifetime. There is no automatic resizing;
    /// provision capacity up front.
    pub capacity: usize,

    /// Whether writes participate in the shard's transaction.
    pub policy: WritePolicy,

    /// Attach a read-only committed view, updated only at commit.
    /// Requires `policy: Transactional` and a shard with a transaction.
    pub committed_view: bool,

    /// The shard whose transaction stages this table's writes.
    pub shard: Shard,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: WritePolicy::Transactional,
            committed_view: false,
            shard: Shard::transactionless(),
        }
    }
}

impl TableConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_view_policy(self.committed_view, self.policy)
    }
}

/// Configuration for an [`Index`](crate::Index).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Number of hash buckets, rounded up to a multiple of 32 at creation.
    pub capacity: usize,

    /// Whether writes participate in the shard's transaction.
    pub policy: WritePolicy,

    /// Attach a read-only committed view, updated only at commit.
    pub committed_view: bool,

    /// The shard whose transaction stages this index's writes.
    pub shard: Shard,

    /// Uniqueness constraint, fixed at creation.
    pub uniqueness: Uniqueness,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: WritePolicy::Transactional,
            committed_view: false,
            shard: Shard::transactionless(),
            uniqueness: Uniqueness::NonUnique,
        }
    }
}

impl IndexConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_view_policy(self.committed_view, self.policy)
    }
}

/// A committed view can only be maintained from the redo log, so it is
/// incompatible with autonomous writes.
fn validate_view_policy(committed_view: bool, policy: WritePolicy) -> Result<()> {
    if committed_view && policy == WritePolicy::Autonomous {
        return Err(VaultError::IllegalState(
            "a committed view requires a transactional write policy".to_string(),
        ));
    }
    Ok(())
}
