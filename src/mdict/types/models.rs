//! Core data structures for MDict format components.
//!
//! This module defines the fundamental types used throughout the library:
//! - File metadata and headers
//! - Block and entry information
//! - Version and method enumerations

use encoding_rs::Encoding;
use super::error::{MdictError, Result};

/// Encryption flags parsed from the MDict header.
///
/// The MDict format uses a bitmask to indicate which parts of the file are encrypted:
/// - Bit 0x01: Record data blocks are encrypted
/// - Bit 0x02: Key index blocks are encrypted
#[derive(Debug, Default)]
pub struct EncryptionFlags {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
}

/// Complete parsed header from an MDict file.
///
/// Contains everything required to parse the file body: the width regime,
/// the text encoding, encryption state, and the user-visible metadata.
#[derive(Debug)]
pub struct MdictHeader {
    pub version: MdictVersion,
    pub encoding: &'static Encoding,
    pub encryption_flags: EncryptionFlags,
    /// Master decryption key derived from a passcode.
    /// `None` if the file is not encrypted or no credentials were provided.
    pub master_key: Option<[u8; 16]>,
    pub metadata: MdictMetadata,
}

/// User-visible metadata carried in the header attribute list.
#[derive(Debug, Clone)]
pub struct MdictMetadata {
    pub title: String,
    pub engine_version: String,
    pub description: Option<String>,
    /// Raw `StyleSheet` attribute text (index/prefix/suffix line triples).
    pub stylesheet_raw: Option<String>,
    /// Whether the container is the binary-resource shape (`<Library_Data>`).
    pub is_mdd: bool,
    /// Whether keys were normalized with punctuation stripping when sorted.
    pub strip_key: bool,
    pub creation_date: Option<String>,
}

/// A single key entry from the dictionary index.
///
/// Associates a search key (word/term or resource path) with its cumulative
/// offset in the virtual decompressed record stream.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub id: u64,
    pub text: String,
}

/// Metadata describing a single compressed data block.
///
/// MDict files are divided into blocks for random access and memory
/// management. Each block can be independently decoded.
#[derive(Debug, Clone, Copy)]
pub struct BlockMeta {
    /// Size of the compressed block data as stored in the file (bytes),
    /// including the 8-byte method/checksum prefix.
    pub compressed_size: u64,
    /// Size of the block after decompression (bytes).
    pub decompressed_size: u64,
    /// Absolute byte offset where this block's compressed data begins in the file.
    pub file_offset: u64,
    /// Offset of this block in the virtual concatenated decompressed stream.
    /// Used for binary search when locating records by offset. The first block has offset 0.
    pub decompressed_offset: u64,
}

/// Key-block metadata: the physical block plus the index summary fields
/// needed to binary-search for a key without decoding the block.
#[derive(Debug, Clone)]
pub struct KeyBlockMeta {
    pub meta: BlockMeta,
    pub entry_count: u64,
    pub first_key: String,
    pub last_key: String,
}

/// Location of a single record inside the record section.
#[derive(Debug, Clone, Copy)]
pub struct RecordInfo {
    pub block_index: usize,
    pub offset_in_block: u64,
    pub size: u64,
}

/// The two numeric-width regimes of the format.
///
/// The regime is selected purely by the engine version string declared in
/// the header, never by file-size heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdictVersion {
    /// Legacy regime ("1.2"): 32-bit section fields, 1-byte text prefixes.
    V1,
    /// "2.0" regime: 64-bit section fields, 2-byte text prefixes,
    /// checksummed and compressed key index.
    V2,
}

impl MdictVersion {
    /// Returns the byte width for numeric fields in this regime.
    pub fn number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 4,
            MdictVersion::V2 => 8,
        }
    }

    /// Returns the byte width for text length prefixes in this regime.
    pub fn small_number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 => 2,
        }
    }

    /// Number of terminator units following length-prefixed key text in the
    /// key index. V1 writes none.
    pub fn text_terminator_units(&self) -> u64 {
        match self {
            MdictVersion::V1 => 0,
            MdictVersion::V2 => 1,
        }
    }

    /// The engine version string written into the header.
    pub fn engine_version(&self) -> &'static str {
        match self {
            MdictVersion::V1 => "1.2",
            MdictVersion::V2 => "2.0",
        }
    }
}

impl TryFrom<f32> for MdictVersion {
    type Error = MdictError;
    fn try_from(v: f32) -> Result<Self> {
        if v < 2.0 {
            Ok(Self::V1)
        } else if v < 3.0 {
            Ok(Self::V2)
        } else {
            Err(MdictError::UnsupportedVersion(v))
        }
    }
}

/// Method tag carried in the first four bytes of every physical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    None,
    Lzo,
    #[default]
    Zlib,
}

impl CompressionType {
    pub fn tag(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lzo => 1,
            CompressionType::Zlib => 2,
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = MdictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzo),
            2 => Ok(Self::Zlib),
            _ => Err(MdictError::InvalidFormat(format!("Unknown compression type: {}", value))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    None,
    Fast,
    Salsa20,
}

impl TryFrom<u8> for EncryptionType {
    type Error = MdictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fast),
            2 => Ok(Self::Salsa20),
            _ => Err(MdictError::InvalidFormat(format!("Unknown encryption type: {}", value))),
        }
    }
}
