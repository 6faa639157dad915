//! Compression and decompression for MDict data blocks.
//!
//! Three methods exist on disk:
//! - None (tag 0): payload stored verbatim
//! - LZO (tag 1): legacy method, raw lzokay buffers with no extra framing;
//!   decompression needs the exact decompressed size up front
//! - Zlib (tag 2): standard deflate via flate2
//!
//! LZO support is compiled in through the default-on `lzo` cargo feature;
//! without it, blocks carrying tag 1 fail with a codec-unavailable error
//! instead of crashing.

use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::trace;

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::CompressionType;

/// Decompress a block payload using the declared method.
///
/// Validates that the decompressed size matches `expected_size` exactly;
/// a disagreement means the index or the block is corrupt.
pub fn decompress_payload(
    payload: &[u8],
    compression_type: CompressionType,
    expected_size: u64,
) -> Result<Vec<u8>> {
    let decompressed = match compression_type {
        CompressionType::None => {
            trace!("No compression, copying {} bytes", payload.len());
            payload.to_vec()
        }
        CompressionType::Lzo => decompress_lzo(payload, expected_size)?,
        CompressionType::Zlib => {
            trace!(
                "Decompressing with Zlib: {} bytes -> {} bytes (expected)",
                payload.len(),
                expected_size
            );
            let mut output = Vec::with_capacity(expected_size as usize);
            let mut decoder = ZlibDecoder::new(payload);
            decoder.read_to_end(&mut output).map_err(|e| {
                MdictError::DecompressionError(format!("Zlib decompression failed: {}", e))
            })?;
            output
        }
    };

    if decompressed.len() as u64 != expected_size {
        return Err(MdictError::SizeMismatch {
            context: "decompressed block".to_string(),
            expected: expected_size,
            found: decompressed.len() as u64,
        });
    }

    Ok(decompressed)
}

/// Compress a block payload with the selected method.
///
/// The writer applies one method uniformly across a container; readers are
/// permissive and honor whatever tag each block declares.
pub fn compress_payload(
    payload: &[u8],
    compression_type: CompressionType,
) -> Result<Vec<u8>> {
    match compression_type {
        CompressionType::None => Ok(payload.to_vec()),
        CompressionType::Lzo => compress_lzo(payload),
        CompressionType::Zlib => {
            use std::io::Write;
            trace!("Compressing {} bytes with Zlib", payload.len());
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
    }
}

#[cfg(feature = "lzo")]
fn decompress_lzo(payload: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    trace!(
        "Decompressing with LZO: {} bytes -> {} bytes (expected)",
        payload.len(),
        expected_size
    );
    let mut output = vec![0u8; expected_size as usize];
    let written = lzokay::decompress::decompress(payload, &mut output)
        .map_err(|e| MdictError::DecompressionError(format!("LZO decompression failed: {:?}", e)))?;
    output.truncate(written);
    Ok(output)
}

#[cfg(not(feature = "lzo"))]
fn decompress_lzo(_payload: &[u8], _expected_size: u64) -> Result<Vec<u8>> {
    Err(MdictError::UnsupportedCodec(
        "LZO support is not compiled in (enable the `lzo` feature)",
    ))
}

#[cfg(feature = "lzo")]
fn compress_lzo(payload: &[u8]) -> Result<Vec<u8>> {
    trace!("Compressing {} bytes with LZO", payload.len());
    lzokay::compress::compress(payload)
        .map_err(|e| MdictError::DecompressionError(format!("LZO compression failed: {:?}", e)))
}

#[cfg(not(feature = "lzo"))]
fn compress_lzo(_payload: &[u8]) -> Result<Vec<u8>> {
    Err(MdictError::UnsupportedCodec(
        "LZO support is not compiled in (enable the `lzo` feature)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress_payload(&data, CompressionType::Zlib).unwrap();
        assert!(compressed.len() < data.len());
        let restored =
            decompress_payload(&compressed, CompressionType::Zlib, data.len() as u64).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn store_round_trip() {
        let data = b"raw bytes".to_vec();
        let stored = compress_payload(&data, CompressionType::None).unwrap();
        assert_eq!(stored, data);
        let restored =
            decompress_payload(&stored, CompressionType::None, data.len() as u64).unwrap();
        assert_eq!(restored, data);
    }

    #[cfg(feature = "lzo")]
    #[test]
    fn lzo_round_trip() {
        let data = b"abcabcabcabcabc".repeat(50);
        let compressed = compress_payload(&data, CompressionType::Lzo).unwrap();
        let restored =
            decompress_payload(&compressed, CompressionType::Lzo, data.len() as u64).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn wrong_declared_size_is_an_error() {
        let data = b"payload".to_vec();
        let compressed = compress_payload(&data, CompressionType::Zlib).unwrap();
        let result = decompress_payload(&compressed, CompressionType::Zlib, 3);
        assert!(result.is_err());
    }
}
