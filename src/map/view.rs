//! Committed view
//!
//! Read-only shadow of a table, showing its content as of the last
//! completed commit (or delayed replay). Entries are physically shared
//! with the live table; the view follows the second link field, which
//! only commit replay rewires.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, VaultError};
use crate::map::core::{Chain, MapCore};
use crate::map::dump;
use crate::map::iter::TableIter;
use crate::map::table::{field_of, region_of};

/// Read-only snapshot of a [`Table`](crate::Table) at its last commit.
pub struct TableView {
    core: Arc<Mutex<MapCore>>,
}

impl TableView {
    pub(crate) fn new(core: Arc<Mutex<MapCore>>) -> Self {
        Self { core }
    }

    /// The committed value for `key`, decompressed.
    pub fn get(&self, key: u64) -> Result<Option<Bytes>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key_on(key, Chain::View) {
            Some(r) => Ok(Some(core.entry(r)?.value()?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: u64) -> Result<bool> {
        let core = self.core.lock();
        core.ensure_open()?;
        Ok(core.find_key_on(key, Chain::View).is_some())
    }

    pub fn length(&self, key: u64) -> Result<Option<usize>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key_on(key, Chain::View) {
            Some(r) => Ok(Some(core.entry(r)?.uncompressed_len as usize)),
            None => Ok(None),
        }
    }

    pub fn compressed_length(&self, key: u64) -> Result<Option<usize>> {
        let core = self.core.lock();
        core.ensure_open()?;
        match core.find_key_on(key, Chain::View) {
            Some(r) => Ok(Some(core.entry(r)?.compressed_length())),
            None => Ok(None),
        }
    }

    pub fn get_region(&self, key: u64, offset: usize, length: usize) -> Result<Option<Bytes>> {
        Ok(self.get(key)?.map(|v| region_of(&v, offset, length)))
    }

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

    /// Number of committed entries.
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

    /// Cursor over the committed entries.
    pub fn iter(&self) -> TableIter {
        TableIter::new(self.core.clone(), Chain::View)
    }

    /// Write the committed content to `path` in the dump format.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let core = self.core.lock();
        core.ensure_open()?;
        dump::write(&core, Chain::View, path)
    }

    // -------------------------------------------------------------------------
    // API parity: views are read-only
    // -------------------------------------------------------------------------

    pub fn set(&self, _key: u64, _value: Option<&[u8]>) -> Result<()> {
        Err(VaultError::NotSupported(
            "committed views are read-only".to_string(),
        ))
    }

    pub fn delete(&self, _key: u64) -> Result<bool> {
        Err(VaultError::NotSupported(
            "committed views are read-only".to_string(),
        ))
    }
}
