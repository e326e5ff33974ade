//! Transactions, redo log, and shards
//!
//! Responsibilities:
//! - Stage every transactional mutation as an undo/replay record
//! - Commit: replay the staged delta into committed views, free replaced
//!   entries, advance the commit reference
//! - Rollback: walk the log backwards restoring the exact prior entries
//! - Safepoints: partial rollback within the open transaction window
//! - Delayed commit: finalize now, replay views later and strictly in
//!   commit order
//!
//! A [`Shard`] groups tables and indexes under one transaction; the
//! process-wide transactionless shard opts structures out entirely.

mod log;
mod shard;
mod transaction;

pub(crate) use log::{LogRecord, TxCore};
pub use shard::Shard;
pub use transaction::{DeltaHandle, Safepoint, Transaction};
