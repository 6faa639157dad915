//! Physical block encoding and decoding.
//!
//! Every key block, record block, and (in the 2.0 regime) the key index
//! share one physical layout:
//!
//! ```text
//! [4 bytes] method tag, little-endian (low nibble: compression,
//!           next nibble: encryption)
//! [4 bytes] Adler-32 of the decompressed bytes, big-endian
//! [N bytes] payload
//! ```
//!
//! This module turns raw on-disk blocks into structured data (key entries,
//! record slices) and back. It sits between the reader/writer orchestration
//! (which handles I/O) and the codec layer (pure data transformation).

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;
use ripemd::{Digest, Ripemd128};

use crate::mdict::codec::{compression, crypto};
use crate::mdict::stylesheet::StyleSheet;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::filetypes::FileType;
use crate::mdict::types::models::{CompressionType, EncryptionType, KeyEntry, MdictHeader, RecordInfo};
use crate::mdict::utils;

/// Decodes a raw, possibly compressed and encrypted block.
///
/// The checksum is recomputed over the decompressed bytes and compared to
/// the stored one; a disagreement is corruption and fails the block.
pub fn decode_block(
    raw_block: &mut [u8],
    expected_decompressed_size: u64,
    master_key: Option<&[u8; 16]>,
) -> Result<Vec<u8>> {
    if raw_block.len() < 8 {
        return Err(MdictError::InvalidFormat(
            "Block too short (minimum 8 bytes required)".to_string(),
        ));
    }

    let info = LittleEndian::read_u32(&raw_block[0..4]);
    let compression_type = CompressionType::try_from((info & 0xF) as u8)?;
    let encryption_type = EncryptionType::try_from(((info >> 4) & 0xF) as u8)?;
    let checksum_expected = BigEndian::read_u32(&raw_block[4..8]);

    trace!(
        "Decoding block: compression={:?}, encryption={:?}, expected_size={} bytes",
        compression_type,
        encryption_type,
        expected_decompressed_size
    );

    if encryption_type != EncryptionType::None {
        // Encrypted foreign file: use the master key when one was derived,
        // otherwise the key is RIPEMD-128 of the block's own checksum bytes.
        let decryption_key: [u8; 16] = match master_key {
            Some(key) => *key,
            None => {
                let mut hasher = Ripemd128::new();
                hasher.update(&raw_block[4..8]);
                hasher.finalize().into()
            }
        };
        let payload = &mut raw_block[8..];
        crypto::decrypt_payload_in_place(payload, encryption_type, &decryption_key);
    }

    let decompressed = compression::decompress_payload(
        &raw_block[8..],
        compression_type,
        expected_decompressed_size,
    )?;

    let checksum_actual = adler32_slice(&decompressed);
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
            context: "block".to_string(),
        });
    }

    Ok(decompressed)
}

/// Encodes a payload into the physical block layout.
///
/// The mirror of [`decode_block`]: checksum over the payload as given,
/// then the compressed bytes. Blocks written by this crate are never
/// encrypted, so the encryption nibble stays zero.
pub fn encode_block(payload: &[u8], compression_type: CompressionType) -> Result<Vec<u8>> {
    let compressed = compression::compress_payload(payload, compression_type)?;

    let mut block = Vec::with_capacity(8 + compressed.len());
    let mut tag = [0u8; 4];
    LittleEndian::write_u32(&mut tag, compression_type.tag() as u32);
    block.extend_from_slice(&tag);

    let mut checksum = [0u8; 4];
    BigEndian::write_u32(&mut checksum, adler32_slice(payload));
    block.extend_from_slice(&checksum);

    block.extend_from_slice(&compressed);
    Ok(block)
}

/// Parses key entries from a decompressed key block.
///
/// Each entry is a cumulative record offset (number-width, big-endian)
/// followed by NUL-terminated key text in the container encoding.
pub fn parse_key_entries(data: &[u8], header: &MdictHeader) -> Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    let mut reader = data;

    while !reader.is_empty() {
        let id = utils::read_number(&mut reader, header.version.number_width())?;
        let text = read_null_terminated_string(&mut reader, header.encoding)?;
        entries.push(KeyEntry { id, text });
    }

    Ok(entries)
}

/// Extracts and processes one record from a pre-loaded, decompressed block.
///
/// Text containers trim the stored terminator during processing. Callers
/// resolving the "to end of block" sentinel compute the exact size first.
pub fn parse_record<T: FileType>(
    block_bytes: &[u8],
    info: &RecordInfo,
    header: &MdictHeader,
    stylesheet: Option<&StyleSheet>,
) -> Result<T::Record> {
    let start = info.offset_in_block as usize;
    let end = start + info.size as usize;
    if end > block_bytes.len() {
        return Err(MdictError::InvalidFormat(format!(
            "Record location [{}..{}] is out of bounds for block of size {}",
            start,
            end,
            block_bytes.len()
        )));
    }

    T::process_record(&block_bytes[start..end], header.encoding, stylesheet)
}

/// Reads a NUL-terminated string from a byte slice and advances the slice.
///
/// UTF-16 text terminates on a 2-byte NUL unit; single-byte encodings on a
/// single NUL byte.
fn read_null_terminated_string(
    reader: &mut &[u8],
    encoding: &'static encoding_rs::Encoding,
) -> Result<String> {
    let width = utils::unit_width(encoding);
    let end_pos = if width == 2 {
        reader
            .chunks_exact(2)
            .position(|chunk| chunk == [0, 0])
            .map(|chunk_index| chunk_index * 2)
    } else {
        reader.iter().position(|&byte| byte == 0)
    }
    .ok_or_else(|| MdictError::InvalidFormat("Missing null terminator in string".to_string()))?;

    let text_bytes = &reader[..end_pos];
    let (decoded, _, had_errors) = encoding.decode(text_bytes);
    if had_errors {
        return Err(MdictError::EncodingError {
            encoding: encoding.name(),
            context: "key text is not valid in the declared encoding".to_string(),
        });
    }

    *reader = &reader[end_pos + width..];

    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trip_all_methods() {
        let payload = b"block payload block payload block payload".to_vec();
        let methods: &[CompressionType] = if cfg!(feature = "lzo") {
            &[CompressionType::None, CompressionType::Zlib, CompressionType::Lzo]
        } else {
            &[CompressionType::None, CompressionType::Zlib]
        };
        for &method in methods {
            let mut block = encode_block(&payload, method).unwrap();
            let decoded = decode_block(&mut block, payload.len() as u64, None).unwrap();
            assert_eq!(decoded, payload, "method {:?}", method);
        }
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let payload = b"sensitive bytes that must not decode silently".to_vec();
        let mut block = encode_block(&payload, CompressionType::None).unwrap();
        let last = block.len() - 1;
        block[last] ^= 0xFF;
        match decode_block(&mut block, payload.len() as u64, None) {
            Err(MdictError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other.map(|_| ())),
        }
    }
}
