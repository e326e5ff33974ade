//! Secondary index engine
//!
//! An index maps an encoded value (byte slice, or a direct 32-bit
//! integer) to the primary keys carrying it. Entries reuse the shared
//! map core, hashed by the 31-bit value hash instead of the key; the
//! value bytes themselves are kept in the entry so colliding hashes can
//! be told apart.
//!
//! Indexes are transactionally coupled to their tables through the
//! shard: one commit or rollback covers both.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::arena::EntryRef;
use crate::config::{IndexConfig, Uniqueness, WritePolicy};
use crate::error::{Result, VaultError};
use crate::index::iter::{BatchedIndexKeys, IndexKeys};
use crate::index::view::IndexView;
use crate::map::core::{hash_slot, Chain, CoreKind, Entry, MapCore};
use crate::tx::{LogRecord, Shard, TxCore};

/// 31-bit hash of an index value.
pub(crate) fn value_hash(value: &[u8]) -> u32 {
    crc32fast::hash(value) & 0x7fff_ffff
}

/// Direct indexes store the value itself in place of a hash.
pub(crate) fn direct_hash(value: i32) -> u32 {
    value as u32
}

/// Find the entry holding `value` (hash and content), on either chain.
pub(crate) fn find_value(
    core: &MapCore,
    hash: u32,
    value: &[u8],
    chain: Chain,
) -> Option<EntryRef> {
    let mut cur = head_for(core, hash, chain);
    while let Some(c) = cur {
        let e = core.arena.try_get(c)?;
        if e.aux_hash == hash && e.data[..] == *value {
            return Some(c);
        }
        cur = link_for(e, chain);
    }
    None
}

/// Find the entry associating `pk` with a value of hash `hash`.
fn find_assoc(core: &MapCore, pk: u64, hash: u32, chain: Chain) -> Option<EntryRef> {
    let mut cur = head_for(core, hash, chain);
    while let Some(c) = cur {
        let e = core.arena.try_get(c)?;
        if e.aux_hash == hash && e.key == pk {
            return Some(c);
        }
        cur = link_for(e, chain);
    }
    None
}

/// A matching (key, hash) pair whose stored bytes differ from the
/// supplied value is a hash collision against a stale caller claim.
fn verify_content(core: &MapCore, r: EntryRef, pk: u64, value: &[u8]) -> Result<()> {
    if core.entry(r)?.data[..] != *value {
        return Err(VaultError::InconsistentIndex(format!(
            "index entry for key {} matches the hash but not the supplied value",
            pk
        )));
    }
    Ok(())
}

pub(crate) fn head_for(core: &MapCore, hash: u32, chain: Chain) -> Option<EntryRef> {
    let slot = hash_slot(hash, core.buckets.len());
    match chain {
        Chain::Live => core.buckets[slot],
        Chain::View => core.view_buckets.as_ref().and_then(|b| b[slot]),
    }
}

pub(crate) fn link_for(e: &Entry, chain: Chain) -> Option<EntryRef> {
    match chain {
        Chain::Live => e.next,
        Chain::View => e.view_next,
    }
}

/// Hash map from index values to primary keys, optionally unique.
pub struct Index {
    core: Arc<Mutex<MapCore>>,
    policy: WritePolicy,
    shard: Shard,
    has_view: bool,
    unique: bool,
}

impl Index {
    pub fn new(config: IndexConfig) -> Result<Index> {
        config.validate()?;
        Ok(Index {
            core: Arc::new(Mutex::new(MapCore::new(
                CoreKind::Index,
                config.capacity,
                config.committed_view,
            ))),
            policy: config.policy,
            shard: config.shard,
            has_view: config.committed_view,
            unique: config.uniqueness == Uniqueness::Unique,
        })
    }

    fn staging_tx(&self) -> Result<Option<Arc<Mutex<TxCore>>>> {
        let tx = self.shard.staging_tx(self.policy);
        if self.has_view && tx.is_none() {
            return Err(VaultError::IllegalState(
                "writes to a view-backed index require an attached transaction".to_string(),
            ));
        }
        Ok(tx)
    }

    fn alloc(core: &mut MapCore, pk: u64, hash: u32, value: &[u8]) -> EntryRef {
        core.arena.alloc(Entry {
            key: pk,
            aux_hash: hash,
            uncompressed_len: value.len() as u32,
            compressed: false,
            data: Bytes::copy_from_slice(value),
            next: None,
            view_next: None,
        })
    }

    // -------------------------------------------------------------------------
    // Mutations (byte values)
    // -------------------------------------------------------------------------

    /// Associate `pk` with `value`. On a unique index an existing entry
    /// for `value` is detected before anything is linked, so a failed
    /// create leaves the index untouched.
    pub fn create(&self, pk: u64, value: &[u8]) -> Result<()> {
        self.create_hashed(pk, value_hash(value), value)
    }

    /// Remove the association of `pk` with `value`; errors when the
    /// index does not hold it, including when a stored entry matches
    /// the value's hash but not its content.
    pub fn delete(&self, pk: u64, value: &[u8]) -> Result<()> {
        self.delete_hashed(pk, value_hash(value), value)
    }

    /// Move `pk` from `old` to `new`. `None` sides degenerate to a plain
    /// create or delete; equal values are a no-op.
    pub fn update(&self, pk: u64, old: Option<&[u8]>, new: Option<&[u8]>) -> Result<()> {
        match (old, new) {
            (None, None) => Ok(()),
            (None, Some(n)) => self.create(pk, n),
            (Some(o), None) => self.delete(pk, o),
            (Some(o), Some(n)) => {
                let (oh, nh) = (value_hash(o), value_hash(n));
                if oh == nh && o == n {
                    return Ok(());
                }
                self.replace_hashed(pk, oh, nh, o, n)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Mutations (direct 32-bit values)
    // -------------------------------------------------------------------------

    /// Like [`create`](Self::create), storing the value itself as the
    /// hash with no byte payload.
    pub fn create_direct(&self, pk: u64, value: i32) -> Result<()> {
        self.create_hashed(pk, direct_hash(value), &[])
    }

    pub fn delete_direct(&self, pk: u64, value: i32) -> Result<()> {
        self.delete_hashed(pk, direct_hash(value), &[])
    }

    pub fn update_direct(&self, pk: u64, old: Option<i32>, new: Option<i32>) -> Result<()> {
        match (old, new) {
            (None, None) => Ok(()),
            (None, Some(n)) => self.create_direct(pk, n),
            (Some(o), None) => self.delete_direct(pk, o),
            (Some(o), Some(n)) => {
                if o == n {
                    return Ok(());
                }
                self.replace_hashed(pk, direct_hash(o), direct_hash(n), &[], &[])
            }
        }
    }

    // -------------------------------------------------------------------------
    // Shared mutation plumbing
    // -------------------------------------------------------------------------

    fn create_hashed(&self, pk: u64, hash: u32, value: &[u8]) -> Result<()> {
        let tx = self.staging_tx()?;
        let new = {
            let mut core = self.core.lock();
            core.ensure_open()?;
            if self.unique && find_value(&core, hash, value, Chain::Live).is_some() {
                return Err(VaultError::DuplicateIndex(format!(
                    "index value already maps to a key (hash 0x{:08x})",
                    hash
                )));
            }
            let r = Self::alloc(&mut core, pk, hash, value);
            core.link(r, Chain::Live)?;
            r
        };
        self.stage(tx, None, Some(new))
    }

    fn delete_hashed(&self, pk: u64, hash: u32, value: &[u8]) -> Result<()> {
        let tx = self.staging_tx()?;
        let old = {
            let mut core = self.core.lock();
            core.ensure_open()?;
            let r = find_assoc(&core, pk, hash, Chain::Live).ok_or_else(|| {
                VaultError::InconsistentIndex(format!(
                    "no index entry associates key {} with hash 0x{:08x}",
                    pk, hash
                ))
            })?;
            verify_content(&core, r, pk, value)?;
            core.unlink(r, Chain::Live)?;
            if tx.is_none() {
                core.arena.free(r)?;
            }
            r
        };
        self.stage(tx, Some(old), None)
    }

    /// Atomic delete-and-create, staged as one record. Uniqueness of the
    /// new value is checked before anything is unlinked.
    fn replace_hashed(
        &self,
        pk: u64,
        old_hash: u32,
        new_hash: u32,
        old_value: &[u8],
        new_value: &[u8],
    ) -> Result<()> {
        let tx = self.staging_tx()?;
        let (old, new) = {
            let mut core = self.core.lock();
            core.ensure_open()?;
            let old = find_assoc(&core, pk, old_hash, Chain::Live).ok_or_else(|| {
                VaultError::InconsistentIndex(format!(
                    "no index entry associates key {} with hash 0x{:08x}",
                    pk, old_hash
                ))
            })?;
            verify_content(&core, old, pk, old_value)?;
            if self.unique {
                if let Some(other) = find_value(&core, new_hash, new_value, Chain::Live) {
                    if other != old {
                        return Err(VaultError::DuplicateIndex(format!(
                            "index value already maps to a key (hash 0x{:08x})",
                            new_hash
                        )));
                    }
                }
            }
            core.unlink(old, Chain::Live)?;
            let new = Self::alloc(&mut core, pk, new_hash, new_value);
            core.link(new, Chain::Live)?;
            if tx.is_none() {
                core.arena.free(old)?;
            }
            (old, new)
        };
        self.stage(tx, Some(old), Some(new))
    }

    fn stage(
        &self,
        tx: Option<Arc<Mutex<TxCore>>>,
        old: Option<EntryRef>,
        new: Option<EntryRef>,
    ) -> Result<()> {
        if let Some(tx) = tx {
            tx.lock().push(LogRecord {
                core: self.core.clone(),
                old,
                new,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// The primary key holding `value`. On a non-unique index this is
    /// the first match in chain order.
    pub fn unique_key_for(&self, value: &[u8]) -> Result<Option<u64>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match find_value(&core, value_hash(value), value, Chain::Live) {
            Some(r) => Ok(Some(core.entry(r)?.key)),
            None => Ok(None),
        }
    }

    pub fn unique_key_for_direct(&self, value: i32) -> Result<Option<u64>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match find_value(&core, direct_hash(value), &[], Chain::Live) {
            Some(r) => Ok(Some(core.entry(r)?.key)),
            None => Ok(None),
        }
    }

    /// Forward-only, single-pass iterator over every primary key holding
    /// `value`.
    pub fn keys_for(&self, value: &[u8]) -> IndexKeys {
        IndexKeys::new(self.core.clone(), value_hash(value), value, Chain::Live)
    }

    /// Like [`keys_for`](Self::keys_for), fetching up to `batch_size`
    /// keys per lock acquisition.
    pub fn keys_for_batched(&self, value: &[u8], batch_size: usize) -> BatchedIndexKeys {
        BatchedIndexKeys::new(
            self.core.clone(),
            value_hash(value),
            value,
            batch_size,
            Chain::Live,
        )
    }

    // -------------------------------------------------------------------------
    // Capacity, diagnostics, lifecycle
    // -------------------------------------------------------------------------

    /// Number of live associations.
    pub fn size(&self) -> usize {
        self.core.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn histogram(&self, buf: &mut [usize]) -> Result<usize> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.histogram(buf, Chain::Live)
    }

    /// Remove every association. Under a transaction this stages one
    /// delete per entry.
    pub fn clear(&self) -> Result<()> {
        let tx = self.staging_tx()?;
        match tx {
            None => {
                let mut core = self.core.lock();
                core.ensure_open()?;
                core.wipe();
                Ok(())
            }
            Some(tx) => {
                let drained = {
                    let mut core = self.core.lock();
                    core.ensure_open()?;
                    core.drain_live()
                };
                let mut tx = tx.lock();
                for old in drained {
                    tx.push(LogRecord {
                        core: self.core.clone(),
                        old: Some(old),
                        new: None,
                    });
                }
                Ok(())
            }
        }
    }

    /// The committed view, when the index was created with one.
    pub fn view(&self) -> Option<IndexView> {
        self.has_view.then(|| IndexView::new(self.core.clone()))
    }

    /// Free every association and mark the index closed.
    pub fn close(self) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.wipe();
        core.closed = true;
        Ok(())
    }
}
