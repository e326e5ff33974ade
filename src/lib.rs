//! VaultKV - Embedded off-heap-style key-value storage engine
//!
//! A single-process storage engine keyed by 64-bit integers:
//! - Fixed-capacity chained hash tables with per-entry LZ4 compression
//! - Optional transactions: staged mutations with commit, rollback, and
//!   nestable safepoints
//! - Committed read-only views, maintained by replaying the redo log at
//!   commit (immediately or delayed, strictly in commit order)
//! - Secondary indexes (unique or non-unique) sharing the transaction
//!   of their shard
//! - Versioned, checksummed binary dump and restore
//!
//! # Example
//!
//! ```no_run
//! use vaultkv::{Shard, Table, TableConfig, Transaction, TransactionMode};
//!
//! fn main() -> vaultkv::Result<()> {
//!     vaultkv::init();
//!
//!     let shard = Shard::new();
//!     let tx = Transaction::new(TransactionMode::transactional());
//!     shard.set_owning_transaction(&tx)?;
//!
//!     let table = Table::new(TableConfig {
//!         shard: shard.clone(),
//!         ..TableConfig::default()
//!     })?;
//!
//!     table.set(42, Some(b"hello"))?;
//!     let rows = tx.commit()?;
//!     assert_eq!(rows, 1);
//!     Ok(())
//! }
//! ```

// =============================================================================
// Modules
// =============================================================================

mod arena;
mod codec;

pub mod config;
pub mod error;
pub mod index;
pub mod map;
pub mod tx;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    IndexConfig, RedoLogMode, TableConfig, TransactionMode, Uniqueness, WritePolicy,
    DEFAULT_CAPACITY,
};
pub use error::{Result, VaultError};
pub use index::{BatchedIndexKeys, Index, IndexKeys, IndexView};
pub use map::{MapEntry, Table, TableIter, TableView};
pub use tx::{DeltaHandle, Safepoint, Shard, Transaction};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::Once;

static INIT: Once = Once::new();

/// Process-wide one-time initialization. Idempotent; call it once before
/// creating any structure.
pub fn init() {
    INIT.call_once(|| {
        tracing::info!(version = VERSION, "vaultkv initialized");
    });
}
