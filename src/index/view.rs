//! Committed index view
//!
//! Read-only shadow of an index as of the last completed commit:
//! lookups and key iteration only.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::index::engine::{direct_hash, find_value, value_hash};
use crate::index::iter::{BatchedIndexKeys, IndexKeys};
use crate::map::core::{Chain, MapCore};

/// Read-only snapshot of an [`Index`](crate::Index) at its last commit.
pub struct IndexView {
    core: Arc<Mutex<MapCore>>,
}

impl IndexView {
    pub(crate) fn new(core: Arc<Mutex<MapCore>>) -> Self {
        Self { core }
    }

    /// The committed primary key holding `value`.
    pub fn unique_key_for(&self, value: &[u8]) -> Result<Option<u64>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match find_value(&core, value_hash(value), value, Chain::View) {
            Some(r) => Ok(Some(core.entry(r)?.key)),
            None => Ok(None),
        }
    }

    pub fn unique_key_for_direct(&self, value: i32) -> Result<Option<u64>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match find_value(&core, direct_hash(value), &[], Chain::View) {
            Some(r) => Ok(Some(core.entry(r)?.key)),
            None => Ok(None),
        }
    }

    /// Committed primary keys holding `value`.
    pub fn keys_for(&self, value: &[u8]) -> IndexKeys {
        IndexKeys::new(self.core.clone(), value_hash(value), value, Chain::View)
    }

    pub fn keys_for_batched(&self, value: &[u8], batch_size: usize) -> BatchedIndexKeys {
        BatchedIndexKeys::new(
            self.core.clone(),
            value_hash(value),
            value,
            batch_size,
            Chain::View,
        )
    }

    /// Number of committed associations.
    pub fn size(&self) -> usize {
        self.core.lock().view_count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn histogram(&self, buf: &mut [usize]) -> Result<usize> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.histogram(buf, Chain::View)
    }
}
