//! Key-section and record-section index parsing.
//!
//! Both sections open with a run of number-width fields (32-bit in the
//! legacy regime, 64-bit in the 2.0 regime) followed by per-block
//! summaries:
//!
//! ```text
//! key section:    [num key blocks][num entries]([index decomp size])
//!                 [index comp size][key blocks total size]([BE checksum])
//!                 [index][key block…]
//! record section: [num record blocks][num entries][index size]
//!                 [blocks total size][index][record block…]
//! ```
//!
//! The key index carries `{entry count, first key, last key, compressed
//! size, decompressed size}` per block; first/last keys are retained so
//! lookups can binary-search for the containing block without decoding it.
//! In the 2.0 regime the index is itself a compressed, checksummed block
//! and may additionally be encrypted.

use std::io::{Read, Seek, SeekFrom};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, info};

use crate::mdict::codec::{compression, crypto};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{
    BlockMeta, CompressionType, KeyBlockMeta, MdictHeader, MdictVersion,
};
use crate::mdict::utils;

/// Everything the reader learns from the two section indexes.
#[derive(Debug)]
pub struct ParsedIndex {
    pub key_blocks: Vec<KeyBlockMeta>,
    pub record_blocks: Vec<BlockMeta>,
    pub num_entries: u64,
    pub total_record_decomp_size: u64,
}

/// Parses both section indexes. The reader is positioned directly after the
/// header; on return it may be anywhere (block reads seek absolutely).
pub fn parse<R: Read + Seek>(file: &mut R, header: &MdictHeader) -> Result<ParsedIndex> {
    let (key_blocks, num_entries) = parse_key_section(file, header)?;

    // Skip the key blocks themselves; records follow immediately.
    let total_key_blocks_size: u64 = key_blocks.iter().map(|b| b.meta.compressed_size).sum();
    file.seek(SeekFrom::Current(total_key_blocks_size as i64))?;

    let (record_blocks, record_entries) = parse_record_section(file, header)?;

    if record_entries != num_entries {
        return Err(MdictError::CountMismatch {
            item_type: "entries in record section".to_string(),
            expected: num_entries,
            found: record_entries,
        });
    }

    let total_record_decomp_size: u64 = record_blocks.iter().map(|b| b.decompressed_size).sum();

    info!(
        "Container indexed: {} entries, {} key blocks, {} record blocks",
        num_entries,
        key_blocks.len(),
        record_blocks.len()
    );

    Ok(ParsedIndex {
        key_blocks,
        record_blocks,
        num_entries,
        total_record_decomp_size,
    })
}

/// Parses the key-section info fields and the key index.
fn parse_key_section<R: Read + Seek>(
    file: &mut R,
    header: &MdictHeader,
) -> Result<(Vec<KeyBlockMeta>, u64)> {
    info!("Parsing key section");

    let info_size = match header.version {
        MdictVersion::V1 => 16, // 4 fields * 4 bytes
        MdictVersion::V2 => 40, // 5 fields * 8 bytes
    };
    let mut info_bytes = vec![0u8; info_size];
    file.read_exact(&mut info_bytes)?;

    if header.encryption_flags.encrypt_record_blocks {
        let key = header.master_key.as_ref().ok_or(MdictError::PasscodeRequired)?;
        debug!("Decrypting key section info (Salsa20)");
        crypto::salsa_decrypt(&mut info_bytes, key);
    }

    // The 2.0 regime checksums the info fields.
    if header.version == MdictVersion::V2 {
        let checksum_expected = file.read_u32::<BigEndian>()?;
        let checksum_actual = adler32_slice(&info_bytes);
        if checksum_actual != checksum_expected {
            return Err(MdictError::ChecksumMismatch {
                expected: checksum_expected,
                actual: checksum_actual,
                context: "key section info".to_string(),
            });
        }
    }

    let width = header.version.number_width();
    let mut reader = info_bytes.as_slice();
    let num_key_blocks = utils::read_number(&mut reader, width)?;
    let num_entries = utils::read_number(&mut reader, width)?;
    let key_index_decomp_len = match header.version {
        MdictVersion::V1 => None,
        MdictVersion::V2 => Some(utils::read_number(&mut reader, width)?),
    };
    let key_index_comp_len = utils::read_number(&mut reader, width)?;
    let _key_blocks_len = utils::read_number(&mut reader, width)?;

    debug!(
        "Key section info: blocks={}, entries={}, index={} bytes",
        num_key_blocks, num_entries, key_index_comp_len
    );

    let mut compressed = vec![0u8; key_index_comp_len as usize];
    file.read_exact(&mut compressed)?;
    let index_data = decompress_key_index(&compressed, key_index_decomp_len, header)?;

    let first_block_offset = file.stream_position()?;
    let key_blocks = parse_key_index(&index_data, header, first_block_offset)?;

    if key_blocks.len() as u64 != num_key_blocks {
        return Err(MdictError::CountMismatch {
            item_type: "key blocks in index".to_string(),
            expected: num_key_blocks,
            found: key_blocks.len() as u64,
        });
    }
    let total_entries: u64 = key_blocks.iter().map(|b| b.entry_count).sum();
    if total_entries != num_entries {
        return Err(MdictError::CountMismatch {
            item_type: "key entries in index".to_string(),
            expected: num_entries,
            found: total_entries,
        });
    }

    Ok((key_blocks, num_entries))
}

/// Decompresses (and if necessary decrypts) the raw key index.
fn decompress_key_index(
    compressed: &[u8],
    decomp_len: Option<u64>,
    header: &MdictHeader,
) -> Result<Vec<u8>> {
    let decomp_len = match decomp_len {
        // Legacy regime: the index is stored raw.
        None => return Ok(compressed.to_vec()),
        Some(len) => len,
    };

    if compressed.len() < 8 {
        return Err(MdictError::InvalidFormat("Key index block too short".to_string()));
    }

    let payload = if header.encryption_flags.encrypt_key_index {
        debug!("Decrypting key index (fast XOR with checksum-derived key)");
        let key = crypto::derive_key_for_v2_index(compressed);
        let mut decrypted = compressed[8..].to_vec();
        crypto::fast_decrypt(&mut decrypted, &key);
        decrypted
    } else {
        compressed[8..].to_vec()
    };

    let compression_type = CompressionType::try_from(LittleEndian::read_u32(&compressed[0..4]) as u8)?;
    let decompressed = compression::decompress_payload(&payload, compression_type, decomp_len)?;

    let checksum_expected = BigEndian::read_u32(&compressed[4..8]);
    let checksum_actual = adler32_slice(&decompressed);
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
            context: "key index".to_string(),
        });
    }

    Ok(decompressed)
}

/// Walks the decompressed key index, collecting per-block summaries.
fn parse_key_index(
    index_data: &[u8],
    header: &MdictHeader,
    first_block_offset: u64,
) -> Result<Vec<KeyBlockMeta>> {
    let width = header.version.number_width();
    let mut blocks = Vec::new();
    let mut reader = index_data;
    let mut file_offset = first_block_offset;
    let mut decompressed_offset = 0u64;

    while !reader.is_empty() {
        let entry_count = utils::read_number(&mut reader, width)?;
        let first_key = read_index_text(&mut reader, header)?;
        let last_key = read_index_text(&mut reader, header)?;
        let compressed_size = utils::read_number(&mut reader, width)?;
        let decompressed_size = utils::read_number(&mut reader, width)?;

        blocks.push(KeyBlockMeta {
            meta: BlockMeta {
                compressed_size,
                decompressed_size,
                file_offset,
                decompressed_offset,
            },
            entry_count,
            first_key,
            last_key,
        });
        file_offset += compressed_size;
        decompressed_offset += decompressed_size;
    }

    Ok(blocks)
}

/// Parses the record-section fields and block index.
fn parse_record_section<R: Read + Seek>(
    file: &mut R,
    header: &MdictHeader,
) -> Result<(Vec<BlockMeta>, u64)> {
    info!("Parsing record section");

    let width = header.version.number_width();
    let num_blocks = utils::read_number(file, width)?;
    let num_entries = utils::read_number(file, width)?;
    let record_index_len = utils::read_number(file, width)?;
    let _record_blocks_len = utils::read_number(file, width)?;

    debug!(
        "Record section info: blocks={}, entries={}, index={} bytes",
        num_blocks, num_entries, record_index_len
    );

    let mut index_data = vec![0u8; record_index_len as usize];
    file.read_exact(&mut index_data)?;

    let mut blocks = Vec::with_capacity(num_blocks as usize);
    let mut reader = index_data.as_slice();
    let mut file_offset = file.stream_position()?;
    let mut decompressed_offset = 0u64;

    while !reader.is_empty() {
        let compressed_size = utils::read_number(&mut reader, width)?;
        let decompressed_size = utils::read_number(&mut reader, width)?;
        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file_offset += compressed_size;
        decompressed_offset += decompressed_size;
    }

    if blocks.len() as u64 != num_blocks {
        return Err(MdictError::CountMismatch {
            item_type: "record blocks in index".to_string(),
            expected: num_blocks,
            found: blocks.len() as u64,
        });
    }

    Ok((blocks, num_entries))
}

/// Reads one length-prefixed key text from the key index.
///
/// The prefix counts code units, not bytes; the 2.0 regime appends one
/// terminator unit after the text.
fn read_index_text(reader: &mut &[u8], header: &MdictHeader) -> Result<String> {
    let len_units = utils::read_small_number(reader, header.version.small_number_width())?;
    let unit = utils::unit_width(header.encoding);
    let text_bytes_len = len_units as usize * unit;
    let total = text_bytes_len + header.version.text_terminator_units() as usize * unit;

    if reader.len() < total {
        return Err(MdictError::InvalidFormat(
            "Incomplete key text in index".to_string(),
        ));
    }

    let (decoded, _, had_errors) = header.encoding.decode(&reader[..text_bytes_len]);
    if had_errors {
        return Err(MdictError::EncodingError {
            encoding: header.encoding.name(),
            context: "index key text is not valid in the declared encoding".to_string(),
        });
    }
    *reader = &reader[total..];
    Ok(decoded.into_owned())
}
