//! Storage table
//!
//! `Table` is the writable front of a data core: a fixed-capacity chained
//! hash map from `u64` keys to byte payloads with per-entry LZ4
//! compression. When the table's shard carries a transaction, every
//! mutation is applied to the live chains immediately and staged in the
//! redo log for commit, rollback, and committed-view replay.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::{TableConfig, WritePolicy};
use crate::error::{Result, VaultError};
use crate::map::core::{Chain, CoreKind, MapCore};
use crate::map::dump;
use crate::map::iter::TableIter;
use crate::map::view::TableView;
use crate::tx::{LogRecord, Shard, TxCore};

/// Chained hash map from 64-bit keys to compressed byte payloads.
pub struct Table {
    core: Arc<Mutex<MapCore>>,
    policy: WritePolicy,
    shard: Shard,
    has_view: bool,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}

impl Table {
    /// Create a table per `config`. The capacity is rounded up to a
    /// multiple of 32 and fixed for the table's lifetime.
    pub fn new(config: TableConfig) -> Result<Table> {
        config.validate()?;
        Ok(Table {
            core: Arc::new(Mutex::new(MapCore::new(
                CoreKind::Data,
                config.capacity,
                config.committed_view,
            ))),
            policy: config.policy,
            shard: config.shard,
            has_view: config.committed_view,
        })
    }

    /// The transaction log this table stages into, if any.
    fn staging_tx(&self) -> Option<Arc<Mutex<TxCore>>> {
        self.shard.staging_tx(self.policy)
    }

    /// Shared write path: replace (or remove, `payload == None`) the
    /// entry for `key`, returning whether one existed and optionally its
    /// prior value.
    fn mutate(
        &self,
        key: u64,
        payload: Option<&[u8]>,
        want_prev: bool,
    ) -> Result<(bool, Option<Bytes>)> {
        let tx = self.staging_tx();
        if self.has_view && tx.is_none() {
            return Err(VaultError::IllegalState(
                "writes to a view-backed table require an attached transaction".to_string(),
            ));
        }
        let (old, new, prev) = {
            let mut core = self.core.lock();
            core.ensure_open()?;
            let old = core.find_key(key);
            let prev = match (want_prev, old) {
                (true, Some(o)) => Some(core.entry(o)?.value()?),
                _ => None,
            };
            if let Some(o) = old {
                core.unlink(o, Chain::Live)?;
            }
            let new = match payload {
                Some(p) => {
                    let r = core.alloc_data_entry(key, p);
                    core.link(r, Chain::Live)?;
                    Some(r)
                }
                None => None,
            };
            if tx.is_none() {
                if let Some(o) = old {
                    core.arena.free(o)?;
                }
            }
            (old, new, prev)
        };
        if let Some(tx) = tx {
            if old.is_some() || new.is_some() {
                tx.lock().push(LogRecord {
                    core: self.core.clone(),
                    old,
                    new,
                });
            }
        }
        Ok((old.is_some(), prev))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The value for `key`, decompressed. `None` when absent; a present
    /// zero-length value is `Some(empty)`.
    pub fn get(&self, key: u64) -> Result<Option<Bytes>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key(key) {
            Some(r) => Ok(Some(core.entry(r)?.value()?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: u64) -> Result<bool> {
        let core = self.core.lock();
        core.ensure_open()?;
        Ok(core.find_key(key).is_some())
    }

    /// Uncompressed length of the value, `None` when absent.
    pub fn length(&self, key: u64) -> Result<Option<usize>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key(key) {
            Some(r) => Ok(Some(core.entry(r)?.uncompressed_len as usize)),
            None => Ok(None),
        }
    }

    /// Stored length: `None` absent, `Some(0)` kept uncompressed,
    /// `Some(n)` compressed to `n` bytes.
    pub fn compressed_length(&self, key: u64) -> Result<Option<usize>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key(key) {
            Some(r) => Ok(Some(core.entry(r)?.compressed_length())),
            None => Ok(None),
        }
    }

    /// A sub-range of the logical value, clamped to its bounds (reads
    /// truncate rather than error).
    pub fn get_region(&self, key: u64, offset: usize, length: usize) -> Result<Option<Bytes>> {
        Ok(self.get(key)?.map(|v| region_of(&v, offset, length)))
    }

    /// The `field_no`-th (0-based) delimiter-separated field of the
    /// value. `None` means the key is absent, the field does not exist,
    /// or the field is logically null (starts with `null_indicator`);
    /// an existing empty field is `Some(empty)`. Pass
    /// `null_indicator == delimiter` when no null convention applies.
    pub fn get_field(
        &self,
        key: u64,
        field_no: usize,
        delimiter: u8,
        null_indicator: u8,
    ) -> Result<Option<Bytes>> {
        Ok(self
            .get(key)?
            .and_then(|v| field_of(&v, field_no, delimiter, null_indicator)))
    }

    /// Copy the value into `buf` starting at `offset`, truncating at the
    /// buffer end. `None` when the key is absent; `Some(0)` when
    /// `offset` is past the buffer.
    pub fn get_into_buffer(&self, key: u64, buf: &mut [u8], offset: usize) -> Result<Option<usize>> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => {
                if offset >= buf.len() {
                    return Ok(Some(0));
                }
                let n = v.len().min(buf.len() - offset);
                buf[offset..offset + n].copy_from_slice(&v[..n]);
                Ok(Some(n))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Store `value` under `key`; `None` deletes.
    pub fn set(&self, key: u64, value: Option<&[u8]>) -> Result<()> {
        self.mutate(key, value, false).map(|_| ())
    }

    /// Store `value` under `key` and return the previous value.
    pub fn put(&self, key: u64, value: Option<&[u8]>) -> Result<Option<Bytes>> {
        self.mutate(key, value, true).map(|(_, prev)| prev)
    }

    /// Remove `key`; true when an entry existed.
    pub fn delete(&self, key: u64) -> Result<bool> {
        self.mutate(key, None, false).map(|(existed, _)| existed)
    }

    /// Remove `key` and return the previous value.
    pub fn remove(&self, key: u64) -> Result<Option<Bytes>> {
        self.mutate(key, None, true).map(|(_, prev)| prev)
    }

    /// Store the sub-range `data[offset .. offset + length]` under
    /// `key`. Unlike reads, an out-of-range request is rejected before
    /// any state changes.
    pub fn set_from_buffer(
        &self,
        key: u64,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<()> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                VaultError::Bounds(format!(
                    "range {}..{}+{} exceeds buffer of {} bytes",
                    offset,
                    offset,
                    length,
                    data.len()
                ))
            })?;
        self.set(key, Some(&data[offset..end]))
    }

    /// Remove every entry. Under a transaction this stages one delete
    /// per live entry, so a rollback restores the full content.
    pub fn clear(&self) -> Result<()> {
        let tx = self.staging_tx();
        if self.has_view && tx.is_none() {
            return Err(VaultError::IllegalState(
                "writes to a view-backed table require an attached transaction".to_string(),
            ));
        }
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

    // -------------------------------------------------------------------------
    // Capacity, diagnostics, compression
    // -------------------------------------------------------------------------

    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.core.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Fill `buf[i]` with the number of hash chains of length exactly
    /// `i` and return the longest chain length.
    pub fn histogram(&self, buf: &mut [usize]) -> Result<usize> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.histogram(buf, Chain::Live)
    }

    /// Payloads longer than `threshold` bytes are stored LZ4-compressed
    /// (when that actually shrinks them). `usize::MAX` disables
    /// compression; that is the default. Applies to subsequent writes
    /// only.
    pub fn set_compression_threshold(&self, threshold: usize) {
        self.core.lock().threshold = threshold;
    }

    pub fn compression_threshold(&self) -> usize {
        self.core.lock().threshold
    }

    // -------------------------------------------------------------------------
    // Views, iteration, persistence, lifecycle
    // -------------------------------------------------------------------------

    /// The committed view, when the table was created with one.
    pub fn view(&self) -> Option<TableView> {
        self.has_view.then(|| TableView::new(self.core.clone()))
    }

    /// Cursor over the live entries. Deleting the entry most recently
    /// returned is the only mutation supported during iteration; any
    /// other invalidates the cursor and ends it.
    pub fn iter(&self) -> TableIter {
        TableIter::new(self.core.clone(), Chain::Live)
    }

    /// Write the live content to `path` in the versioned dump format.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let core = self.core.lock();
        core.ensure_open()?;
        dump::write(&core, Chain::Live, path)
    }

    /// Load a dump into this (empty) table. When the table carries a
    /// committed view, the restored entries seed the view as well.
    pub fn read_from_file(&self, path: &Path) -> Result<usize> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        dump::read(&mut core, path)
    }

    /// Free every entry and mark the table closed. Later operations
    /// through surviving views or cursors report an illegal state.
    pub fn close(self) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.wipe();
        core.closed = true;
        Ok(())
    }
}

// =============================================================================
// Shared read helpers (table and view)
// =============================================================================

/// Clamp `offset`/`length` to the value's bounds and slice. An offset
/// at or past the end yields an empty region without touching the
/// buffer (`Bytes::slice` rejects even empty out-of-bounds ranges).
pub(crate) fn region_of(value: &Bytes, offset: usize, length: usize) -> Bytes {
    if offset >= value.len() {
        return Bytes::new();
    }
    let n = length.min(value.len() - offset);
    value.slice(offset..offset + n)
}

/// Extract the `field_no`-th delimiter-separated field; `None` for a
/// missing or logically-null field.
pub(crate) fn field_of(
    value: &Bytes,
    field_no: usize,
    delimiter: u8,
    null_indicator: u8,
) -> Option<Bytes> {
    let mut i = 0;
    let mut remaining = field_no;
    while remaining > 0 && i < value.len() {
        let b = value[i];
        if b == delimiter || b == null_indicator {
            remaining -= 1;
        }
        i += 1;
    }
    if remaining > 0 {
        return None;
    }
    if i < value.len() && value[i] == null_indicator && null_indicator != delimiter {
        return None;
    }
    let start = i;
    while i < value.len() && value[i] != delimiter && value[i] != null_indicator {
        i += 1;
    }
    Some(value.slice(start..i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    // -------------------------------------------------------------------------
    // Field extraction
    // -------------------------------------------------------------------------

    #[test]
    fn field_extraction_basics() {
        let v = val("alpha;beta;;delta");
        assert_eq!(field_of(&v, 0, b';', b'\0'), Some(val("alpha")));
        assert_eq!(field_of(&v, 1, b';', b'\0'), Some(val("beta")));
        assert_eq!(field_of(&v, 2, b';', b'\0'), Some(val("")));
        assert_eq!(field_of(&v, 3, b';', b'\0'), Some(val("delta")));
        assert_eq!(field_of(&v, 4, b';', b'\0'), None);
    }

    #[test]
    fn field_null_indicator_distinguishes_null_from_empty() {
        // field 1 is null, field 2 is empty
        let v = val("a;\0b;;c");
        assert_eq!(field_of(&v, 1, b';', b'\0'), None);
        assert_eq!(field_of(&v, 2, b';', b'\0'), Some(val("")));
        // with null == delimiter, the null byte is just a separator
        assert_eq!(field_of(&v, 1, b';', b';'), Some(val("\0b")));
    }

    #[test]
    fn field_at_end_of_value() {
        let v = val("x;y");
        assert_eq!(field_of(&v, 1, b';', b'\0'), Some(val("y")));
        // trailing delimiter means a final empty field exists
        let v = val("x;y;");
        assert_eq!(field_of(&v, 2, b';', b'\0'), Some(val("")));
    }

    // -------------------------------------------------------------------------
    // Region clamping
    // -------------------------------------------------------------------------

    #[test]
    fn region_clamps_to_value_bounds() {
        let v = val("0123456789");
        assert_eq!(region_of(&v, 0, 4), val("0123"));
        assert_eq!(region_of(&v, 6, 100), val("6789"));
        assert_eq!(region_of(&v, 10, 1), val(""));
        assert_eq!(region_of(&v, 99, 1), val(""));
    }
}
