//! Compression codec
//!
//! Stateless LZ4 block compression for entry payloads. The uncompressed
//! length is kept in the entry header, so the raw block format (no size
//! prefix) is used for both directions.
//!
//! Rules:
//! - Zero-length payloads are never compressed.
//! - A payload is compressed only when it is longer than the table's
//!   compression threshold AND the compressed form is actually smaller;
//!   otherwise the raw bytes are stored and the entry is flagged
//!   uncompressed.

use bytes::Bytes;

use crate::error::{Result, VaultError};

/// Outcome of [`maybe_compress`]: the bytes to store plus whether they are
/// the compressed form.
pub(crate) struct Encoded {
    pub data: Bytes,
    pub compressed: bool,
}

/// Compress `payload` if it exceeds `threshold` and compression pays off.
pub(crate) fn maybe_compress(payload: &[u8], threshold: usize) -> Encoded {
    if !payload.is_empty() && payload.len() > threshold {
        let compressed = lz4_flex::compress(payload);
        if compressed.len() < payload.len() {
            return Encoded {
                data: Bytes::from(compressed),
                compressed: true,
            };
        }
    }
    Encoded {
        data: Bytes::copy_from_slice(payload),
        compressed: false,
    }
}

/// Decompress a stored block back to its original `uncompressed_len` bytes.
pub(crate) fn decompress(stored: &[u8], uncompressed_len: usize) -> Result<Bytes> {
    let raw = lz4_flex::decompress(stored, uncompressed_len)
        .map_err(|e| VaultError::Corrupt(format!("LZ4 decompression failed: {}", e)))?;
    if raw.len() != uncompressed_len {
        return Err(VaultError::Corrupt(format!(
            "decompressed {} bytes, expected {}",
            raw.len(),
            uncompressed_len
        )));
    }
    Ok(Bytes::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_above_threshold() {
        let payload = vec![7u8; 4096];
        let enc = maybe_compress(&payload, 0);
        assert!(enc.compressed);
        assert!(enc.data.len() < payload.len());
        assert_eq!(&decompress(&enc.data, 4096).unwrap()[..], &payload[..]);
    }

    #[test]
    fn stores_raw_below_threshold() {
        let payload = b"small".to_vec();
        let enc = maybe_compress(&payload, 1024);
        assert!(!enc.compressed);
        assert_eq!(&enc.data[..], &payload[..]);
    }

    #[test]
    fn never_compresses_empty() {
        let enc = maybe_compress(&[], 0);
        assert!(!enc.compressed);
        assert!(enc.data.is_empty());
    }

    #[test]
    fn falls_back_when_incompressible() {
        // pseudo-random bytes do not shrink under LZ4
        let payload: Vec<u8> = (0..1024u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let enc = maybe_compress(&payload, 0);
        if enc.compressed {
            assert!(enc.data.len() < payload.len());
        } else {
            assert_eq!(&enc.data[..], &payload[..]);
        }
    }
}
