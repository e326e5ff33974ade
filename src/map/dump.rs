//! Dump and restore
//!
//! Versioned binary snapshot of a table (or its committed view):
//!
//! ```text
//! [ header: magic, version, record count, last committed ref ]  bincode
//! [ record: key, uncompressed_len, compressed, stored bytes ]*  bincode
//! [ CRC32 of everything above ]                                 4 bytes LE
//! ```
//!
//! Entries are written in stored form, so compressed entries stay
//! compressed on disk. Restore requires an empty table and seeds the
//! committed view (when one exists) with the restored entries.
//!
//! Indexes are not dumped; they are rebuilt from their tables.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VaultError};
use crate::map::core::{Chain, Entry, MapCore};

/// "VKDV"
const MAGIC: u32 = 0x564B_4456;
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct DumpHeader {
    magic: u32,
    version: u32,
    records: u64,
    last_committed_ref: i64,
}

#[derive(Serialize, Deserialize)]
struct DumpRecord {
    key: u64,
    uncompressed_len: u32,
    compressed: bool,
    data: Vec<u8>,
}

fn codec_err(what: &str, e: bincode::Error) -> VaultError {
    VaultError::Corrupt(format!("dump {}: {}", what, e))
}

/// Serialize one chain of `core` to `path`.
pub(crate) fn write(core: &MapCore, chain: Chain, path: &Path) -> Result<()> {
    let records = match chain {
        Chain::Live => core.count,
        Chain::View => core.view_count,
    };
    let header = DumpHeader {
        magic: MAGIC,
        version: VERSION,
        records: records as u64,
        last_committed_ref: core.last_committed_ref,
    };
    let mut buf = Vec::new();
    bincode::serialize_into(&mut buf, &header).map_err(|e| codec_err("encode", e))?;

    let mut written = 0usize;
    let mut pos = core.advance(0, None, chain);
    while let Some((slot, r)) = pos {
        let e = core.entry(r)?;
        let record = DumpRecord {
            key: e.key,
            uncompressed_len: e.uncompressed_len,
            compressed: e.compressed,
            data: e.data.to_vec(),
        };
        bincode::serialize_into(&mut buf, &record).map_err(|e| codec_err("encode", e))?;
        written += 1;
        pos = core.advance(slot, Some(r), chain);
    }
    if written != records {
        return Err(VaultError::IllegalState(format!(
            "entry count changed during dump: expected {}, wrote {}",
            records, written
        )));
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    std::fs::write(path, &buf)?;
    info!(records, bytes = buf.len(), path = %path.display(), "table dumped");
    Ok(())
}

/// Load a dump from `path` into an empty `core`, returning the number of
/// restored records.
pub(crate) fn read(core: &mut MapCore, path: &Path) -> Result<usize> {
    if core.count != 0 || core.view_count != 0 {
        return Err(VaultError::IllegalState(
            "restore requires an empty table".to_string(),
        ));
    }
    let buf = std::fs::read(path)?;
    if buf.len() < 4 {
        return Err(VaultError::Corrupt("dump file is truncated".to_string()));
    }
    let (body, trailer) = buf.split_at(buf.len() - 4);
    let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if crc32fast::hash(body) != stored_crc {
        return Err(VaultError::Corrupt("dump checksum mismatch".to_string()));
    }

    let mut cursor = Cursor::new(body);
    let header: DumpHeader =
        bincode::deserialize_from(&mut cursor).map_err(|e| codec_err("decode", e))?;
    if header.magic != MAGIC {
        return Err(VaultError::Corrupt(format!(
            "bad dump magic 0x{:08x}",
            header.magic
        )));
    }
    if header.version != VERSION {
        return Err(VaultError::Corrupt(format!(
            "unsupported dump version {}",
            header.version
        )));
    }

    for _ in 0..header.records {
        let rec: DumpRecord =
            bincode::deserialize_from(&mut cursor).map_err(|e| codec_err("decode", e))?;
        let r = core.arena.alloc(Entry {
            key: rec.key,
            aux_hash: 0,
            uncompressed_len: rec.uncompressed_len,
            compressed: rec.compressed,
            data: Bytes::from(rec.data),
            next: None,
            view_next: None,
        });
        core.link(r, Chain::Live)?;
        if core.view_buckets.is_some() {
            core.link(r, Chain::View)?;
        }
    }
    core.last_committed_ref = header.last_committed_ref;
    info!(
        records = header.records,
        path = %path.display(),
        "table restored"
    );
    Ok(header.records as usize)
}
