//! Table and view cursors
//!
//! The cursor pre-fetches its successor before handing out an entry, so
//! deleting the entry most recently returned (through the table) cannot
//! strand it. Any other concurrent mutation that touches the pre-fetched
//! entry trips the arena generation check and ends the iteration.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::arena::EntryRef;
use crate::error::Result;
use crate::map::core::{Chain, MapCore};

/// Flyweight handle to one entry: the key is captured, the value is
/// fetched (and decompressed) from the backing store on demand.
pub struct MapEntry {
    core: Arc<Mutex<MapCore>>,
    entry: EntryRef,
    key: u64,
}

impl MapEntry {
    pub fn key(&self) -> u64 {
        self.key
    }

    /// The entry's value. Errors if the entry was deleted or the table
    /// closed since this handle was returned.
    pub fn value(&self) -> Result<Bytes> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.entry(self.entry)?.value()
    }
}

/// Cursor over a table's live entries or a view's committed entries.
pub struct TableIter {
    core: Arc<Mutex<MapCore>>,
    chain: Chain,
    next: Option<(usize, EntryRef)>,
}

impl TableIter {
    pub(crate) fn new(core: Arc<Mutex<MapCore>>, chain: Chain) -> Self {
        let next = {
            let guard = core.lock();
            if guard.closed {
                None
            } else {
                guard.advance(0, None, chain)
            }
        };
        Self { core, chain, next }
    }
}

impl Iterator for TableIter {
    type Item = MapEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let (slot, entry) = self.next.take()?;
        let key = {
            let core = self.core.lock();
            if core.closed {
                return None;
            }
            // a stale position means the cursor was invalidated
            let key = core.arena.try_get(entry)?.key;
            self.next = core.advance(slot, Some(entry), self.chain);
            key
        };
        Some(MapEntry {
            core: self.core.clone(),
            entry,
            key,
        })
    }
}
