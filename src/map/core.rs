//! Shared hash-map core
//!
//! One `MapCore` backs every table and index:
//! - Fixed bucket array (no resizing), entries chained per slot
//! - Entries live in a generation-checked arena
//! - Optional second bucket array for the committed view; an entry is
//!   linked into both chains at once through its two link fields
//! - Replay/undo primitives consumed by the transaction log
//!
//! Data cores hash the 64-bit key; index cores hash the stored
//! `aux_hash` (the 31-bit hash of the index value).

use bytes::Bytes;

use crate::arena::{Arena, EntryRef};
use crate::codec;
use crate::error::{Result, VaultError};

// =============================================================================
// Entry
// =============================================================================

/// One stored record, shared between the live chain and (when present)
/// the committed-view chain.
pub(crate) struct Entry {
    pub key: u64,
    /// Index cores only: 31-bit hash of the index value (or the direct
    /// value itself). Zero for data cores.
    pub aux_hash: u32,
    pub uncompressed_len: u32,
    pub compressed: bool,
    /// Stored form: compressed or raw, per `compressed`.
    pub data: Bytes,
    pub next: Option<EntryRef>,
    pub view_next: Option<EntryRef>,
}

impl Entry {
    /// The logical (uncompressed) payload.
    pub fn value(&self) -> Result<Bytes> {
        if self.compressed {
            codec::decompress(&self.data, self.uncompressed_len as usize)
        } else {
            Ok(self.data.clone())
        }
    }

    /// Stored size: `Some(0)` when kept raw, `Some(n)` when compressed.
    pub fn compressed_length(&self) -> usize {
        if self.compressed {
            self.data.len()
        } else {
            0
        }
    }
}

// =============================================================================
// Slot math
// =============================================================================

/// Capacities are rounded up to a multiple of 32.
pub(crate) fn round_capacity(requested: usize) -> usize {
    ((requested.max(1) - 1) | 31) + 1
}

/// Multiply-by-33 hash of the primary key, folded to 31 bits.
pub(crate) fn key_slot(key: u64, buckets: usize) -> usize {
    let h = key.wrapping_mul(33);
    (((h ^ (h >> 32)) as u32 & 0x7fff_ffff) as usize) % buckets
}

/// Slot for a precomputed index-value hash.
pub(crate) fn hash_slot(hash: u32, buckets: usize) -> usize {
    ((hash & 0x7fff_ffff) as usize) % buckets
}

// =============================================================================
// MapCore
// =============================================================================

/// Which chain a walk follows.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chain {
    Live,
    View,
}

/// Whether a core hashes by primary key or by index-value hash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum CoreKind {
    Data,
    Index,
}

pub(crate) struct MapCore {
    pub kind: CoreKind,
    pub buckets: Vec<Option<EntryRef>>,
    pub view_buckets: Option<Vec<Option<EntryRef>>>,
    pub count: usize,
    pub view_count: usize,
    /// Commit reference of the last transaction replayed into this core,
    /// persisted in dumps.
    pub last_committed_ref: i64,
    /// Payloads longer than this are LZ4-compressed. `usize::MAX`
    /// disables compression.
    pub threshold: usize,
    pub arena: Arena<Entry>,
    pub closed: bool,
}

impl MapCore {
    pub fn new(kind: CoreKind, capacity: usize, with_view: bool) -> Self {
        let n = round_capacity(capacity);
        Self {
            kind,
            buckets: vec![None; n],
            view_buckets: with_view.then(|| vec![None; n]),
            count: 0,
            view_count: 0,
            last_committed_ref: 0,
            threshold: usize::MAX,
            arena: Arena::new(),
            closed: false,
        }
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(VaultError::IllegalState(
                "operation on a closed structure".to_string(),
            ));
        }
        Ok(())
    }

    pub fn entry(&self, r: EntryRef) -> Result<&Entry> {
        self.arena.get(r)
    }

    fn slot_of(&self, e: &Entry) -> usize {
        match self.kind {
            CoreKind::Data => key_slot(e.key, self.buckets.len()),
            CoreKind::Index => hash_slot(e.aux_hash, self.buckets.len()),
        }
    }

    fn link_of(&self, r: EntryRef, chain: Chain) -> Result<Option<EntryRef>> {
        let e = self.arena.get(r)?;
        Ok(match chain {
            Chain::Live => e.next,
            Chain::View => e.view_next,
        })
    }

    fn set_link(&mut self, r: EntryRef, chain: Chain, to: Option<EntryRef>) -> Result<()> {
        let e = self.arena.get_mut(r)?;
        match chain {
            Chain::Live => e.next = to,
            Chain::View => e.view_next = to,
        }
        Ok(())
    }

    fn head(&self, slot: usize, chain: Chain) -> Option<EntryRef> {
        match chain {
            Chain::Live => self.buckets[slot],
            Chain::View => self.view_buckets.as_ref().and_then(|b| b[slot]),
        }
    }

    fn set_head(&mut self, slot: usize, chain: Chain, to: Option<EntryRef>) {
        match chain {
            Chain::Live => self.buckets[slot] = to,
            Chain::View => {
                if let Some(b) = self.view_buckets.as_mut() {
                    b[slot] = to;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Chain surgery
    // -------------------------------------------------------------------------

    /// Link an entry at the head of its slot chain.
    pub fn link(&mut self, r: EntryRef, chain: Chain) -> Result<()> {
        let slot = self.slot_of(self.arena.get(r)?);
        let head = self.head(slot, chain);
        self.set_link(r, chain, head)?;
        self.set_head(slot, chain, Some(r));
        match chain {
            Chain::Live => self.count += 1,
            Chain::View => self.view_count += 1,
        }
        Ok(())
    }

    /// Unlink a specific entry (by identity) from a chain. Returns false
    /// when the entry is not on the chain.
    pub fn unlink(&mut self, r: EntryRef, chain: Chain) -> Result<bool> {
        let slot = self.slot_of(self.arena.get(r)?);
        let mut prev: Option<EntryRef> = None;
        let mut cur = self.head(slot, chain);
        while let Some(c) = cur {
            if c == r {
                let after = self.link_of(c, chain)?;
                match prev {
                    Some(p) => self.set_link(p, chain, after)?,
                    None => self.set_head(slot, chain, after),
                }
                self.set_link(c, chain, None)?;
                match chain {
                    Chain::Live => self.count -= 1,
                    Chain::View => self.view_count -= 1,
                }
                return Ok(true);
            }
            prev = cur;
            cur = self.link_of(c, chain)?;
        }
        Ok(false)
    }

    /// Find the live entry for a primary key (data cores).
    pub fn find_key(&self, key: u64) -> Option<EntryRef> {
        self.find_key_on(key, Chain::Live)
    }

    /// Find the entry for a primary key on a given chain (data cores).
    pub fn find_key_on(&self, key: u64, chain: Chain) -> Option<EntryRef> {
        let slot = key_slot(key, self.buckets.len());
        let mut cur = self.head(slot, chain);
        while let Some(c) = cur {
            let e = self.arena.try_get(c)?;
            if e.key == key {
                return Some(c);
            }
            cur = match chain {
                Chain::Live => e.next,
                Chain::View => e.view_next,
            };
        }
        None
    }

    /// Unlink and return the live entry for a primary key, if any.
    pub fn unlink_key(&mut self, key: u64) -> Result<Option<EntryRef>> {
        match self.find_key(key) {
            Some(r) => {
                self.unlink(r, Chain::Live)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Transaction replay / undo
    // -------------------------------------------------------------------------

    /// Apply one committed log record: publish `new` to the view and
    /// retire `old`. Without a view this just frees the replaced entry.
    pub fn replay(&mut self, old: Option<EntryRef>, new: Option<EntryRef>) -> Result<()> {
        if self.view_buckets.is_some() {
            if let Some(n) = new {
                self.link(n, Chain::View)?;
            }
            if let Some(o) = old {
                self.unlink(o, Chain::View)?;
                self.arena.free(o)?;
            }
        } else if let Some(o) = old {
            self.arena.free(o)?;
        }
        Ok(())
    }

    /// Undo one staged log record: discard `new` from the live chain and
    /// restore `old` to it.
    pub fn undo(&mut self, old: Option<EntryRef>, new: Option<EntryRef>) -> Result<()> {
        if let Some(n) = new {
            self.unlink(n, Chain::Live)?;
            self.arena.free(n)?;
        }
        if let Some(o) = old {
            self.link(o, Chain::Live)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Value construction
    // -------------------------------------------------------------------------

    /// Build a data entry from a raw payload, applying the compression
    /// threshold, and store it (unlinked) in the arena.
    pub fn alloc_data_entry(&mut self, key: u64, payload: &[u8]) -> EntryRef {
        let enc = codec::maybe_compress(payload, self.threshold);
        self.arena.alloc(Entry {
            key,
            aux_hash: 0,
            uncompressed_len: payload.len() as u32,
            compressed: enc.compressed,
            data: enc.data,
            next: None,
            view_next: None,
        })
    }

    // -------------------------------------------------------------------------
    // Diagnostics / iteration support
    // -------------------------------------------------------------------------

    /// Fill `buf[i]` with the number of chains of length exactly `i`
    /// (chains longer than the buffer are not counted) and return the
    /// longest chain length.
    pub fn histogram(&self, buf: &mut [usize], chain: Chain) -> Result<usize> {
        buf.fill(0);
        let mut longest = 0;
        for slot in 0..self.buckets.len() {
            let mut len = 0usize;
            let mut cur = self.head(slot, chain);
            while let Some(c) = cur {
                len += 1;
                cur = self.link_of(c, chain)?;
            }
            if len > longest {
                longest = len;
            }
            if let Some(b) = buf.get_mut(len) {
                *b += 1;
            }
        }
        Ok(longest)
    }

    /// Position of the entry after `(slot, cur)` in chain-then-bucket
    /// order; `cur == None` scans from `slot` itself. A stale `cur`
    /// (deleted under the cursor) ends the walk.
    pub fn advance(
        &self,
        slot: usize,
        cur: Option<EntryRef>,
        chain: Chain,
    ) -> Option<(usize, EntryRef)> {
        let mut slot = slot;
        if let Some(c) = cur {
            let e = self.arena.try_get(c)?;
            let next = match chain {
                Chain::Live => e.next,
                Chain::View => e.view_next,
            };
            if let Some(n) = next {
                return Some((slot, n));
            }
            slot += 1;
        }
        while slot < self.buckets.len() {
            if let Some(h) = self.head(slot, chain) {
                return Some((slot, h));
            }
            slot += 1;
        }
        None
    }

    /// Unlink every live entry at once, returning the refs in no
    /// particular order. Entries stay allocated (and view-linked) so a
    /// transactional clear can stage one delete per entry.
    pub fn drain_live(&mut self) -> Vec<EntryRef> {
        let mut refs = Vec::with_capacity(self.count);
        for slot in 0..self.buckets.len() {
            let mut cur = self.buckets[slot].take();
            while let Some(c) = cur {
                refs.push(c);
                cur = self.arena.try_get(c).and_then(|e| e.next);
            }
        }
        self.count = 0;
        refs
    }

    /// Drop every entry and reset both bucket arrays. Used by `close()`
    /// and by non-transactional `clear()`.
    pub fn wipe(&mut self) {
        self.arena.clear();
        self.buckets.fill(None);
        if let Some(b) = self.view_buckets.as_mut() {
            b.fill(None);
        }
        self.count = 0;
        self.view_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> MapCore {
        MapCore::new(CoreKind::Data, 32, false)
    }

    #[test]
    fn capacity_rounds_to_multiple_of_32() {
        assert_eq!(round_capacity(1), 32);
        assert_eq!(round_capacity(32), 32);
        assert_eq!(round_capacity(33), 64);
        assert_eq!(round_capacity(4096), 4096);
    }

    #[test]
    fn link_find_unlink() {
        let mut c = core();
        let r = c.alloc_data_entry(42, b"hello");
        c.link(r, Chain::Live).unwrap();
        assert_eq!(c.count, 1);
        assert_eq!(c.find_key(42), Some(r));
        assert_eq!(c.find_key(43), None);
        assert_eq!(c.unlink_key(42).unwrap(), Some(r));
        assert_eq!(c.count, 0);
        assert_eq!(c.find_key(42), None);
    }

    #[test]
    fn colliding_keys_chain_in_one_slot() {
        let mut c = core();
        // keys congruent modulo the bucket count collide by construction
        let n = c.buckets.len() as u64;
        let keys: Vec<u64> = (0..4).map(|i| 7 + i * n).collect();
        let slots: Vec<usize> = keys.iter().map(|k| key_slot(*k, n as usize)).collect();
        for k in &keys {
            let r = c.alloc_data_entry(*k, b"x");
            c.link(r, Chain::Live).unwrap();
        }
        if slots.iter().all(|s| *s == slots[0]) {
            let mut buf = vec![0usize; 8];
            assert_eq!(c.histogram(&mut buf, Chain::Live).unwrap(), 4);
            assert_eq!(buf[4], 1);
        }
        for k in &keys {
            assert!(c.find_key(*k).is_some());
        }
    }

    #[test]
    fn undo_restores_prior_entry() {
        let mut c = core();
        let old = c.alloc_data_entry(1, b"before");
        c.link(old, Chain::Live).unwrap();
        c.unlink(old, Chain::Live).unwrap();
        let new = c.alloc_data_entry(1, b"after");
        c.link(new, Chain::Live).unwrap();

        c.undo(Some(old), Some(new)).unwrap();
        let r = c.find_key(1).unwrap();
        assert_eq!(&c.entry(r).unwrap().value().unwrap()[..], b"before");
    }

    #[test]
    fn replay_without_view_frees_old() {
        let mut c = core();
        let old = c.alloc_data_entry(1, b"before");
        c.link(old, Chain::Live).unwrap();
        c.unlink(old, Chain::Live).unwrap();
        let new = c.alloc_data_entry(1, b"after");
        c.link(new, Chain::Live).unwrap();

        c.replay(Some(old), Some(new)).unwrap();
        assert!(c.arena.try_get(old).is_none());
        assert_eq!(c.find_key(1), Some(new));
    }

    #[test]
    fn replay_publishes_to_view() {
        let mut c = MapCore::new(CoreKind::Data, 32, true);
        let e = c.alloc_data_entry(9, b"v1");
        c.link(e, Chain::Live).unwrap();
        assert_eq!(c.find_key_on(9, Chain::View), None);

        c.replay(None, Some(e)).unwrap();
        assert_eq!(c.find_key_on(9, Chain::View), Some(e));
        assert_eq!(c.view_count, 1);

        // replace: new entry supersedes, old one leaves both worlds
        c.unlink(e, Chain::Live).unwrap();
        let e2 = c.alloc_data_entry(9, b"v2");
        c.link(e2, Chain::Live).unwrap();
        c.replay(Some(e), Some(e2)).unwrap();
        assert_eq!(c.find_key_on(9, Chain::View), Some(e2));
        assert_eq!(c.view_count, 1);
        assert!(c.arena.try_get(e).is_none());
    }

    #[test]
    fn advance_walks_every_entry_once() {
        let mut c = core();
        for k in [12312u64, 23423, 6166, 182638] {
            let r = c.alloc_data_entry(k, b"v");
            c.link(r, Chain::Live).unwrap();
        }
        let mut seen = Vec::new();
        let mut pos = c.advance(0, None, Chain::Live);
        while let Some((slot, r)) = pos {
            seen.push(c.entry(r).unwrap().key);
            pos = c.advance(slot, Some(r), Chain::Live);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![6166, 12312, 23423, 182638]);
    }
}
