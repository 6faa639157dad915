//! High-level container writer.
//!
//! Assembles a full container from an unordered collection of entries:
//! validate, sort under the collation order, compute cumulative offsets,
//! split into key and record blocks independently, compress every block
//! with the configured method, and emit header, key section, and record
//! section in that fixed order with no gaps.

pub mod blocks;
pub mod entry;

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use encoding_rs::{Encoding, UTF_16LE, UTF_8};
use log::{debug, info};

use super::collate::{Collation, MdictCollator};
use super::format::{content, header};
use super::types::error::{MdictError, Result};
use super::types::models::{CompressionType, MdictVersion};
use super::utils;
use self::blocks::SizedEntryCodec;
use self::entry::{Entry, PayloadSource, SourceSet};

/// Options for a write pass. The defaults mirror the classic packer:
/// 32 KiB key blocks, 64 KiB record blocks, UTF-8, the "2.0" regime,
/// zlib compression, text shape.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub title: String,
    pub description: String,
    /// Raw stylesheet text for the header attribute (text shape only).
    pub stylesheet: String,
    /// Pre-compression budget for the encoded key list of one key block.
    pub key_block_size: u64,
    /// Pre-compression budget for one record block's payload bytes.
    pub record_block_size: u64,
    pub encoding: &'static Encoding,
    pub version: MdictVersion,
    pub compression: CompressionType,
    /// Binary-resource shape (`.mdd`) instead of the text shape (`.mdx`).
    pub is_mdd: bool,
    /// `YYYY-M-D` override; today when `None`.
    pub creation_date: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            stylesheet: String::new(),
            key_block_size: 32 * 1024,
            record_block_size: 64 * 1024,
            encoding: UTF_8,
            version: MdictVersion::V2,
            compression: CompressionType::Zlib,
            is_mdd: false,
            creation_date: None,
        }
    }
}

/// One row of the writer's offset table: an entry with its encoded key and
/// its position in the virtual decompressed record stream.
///
/// Rows live only for the duration of a write pass.
#[derive(Debug)]
pub(crate) struct OffsetEntry {
    pub(crate) key: String,
    /// Key bytes in the container encoding, NUL-terminated.
    pub(crate) key_null: Vec<u8>,
    /// Encoded key length in code units, terminator excluded.
    pub(crate) key_len_units: u64,
    /// Cumulative payload offset; `offset(i+1) = offset(i) + record_size(i)`.
    pub(crate) offset: u64,
    /// Payload bytes on disk, terminator included for text containers.
    pub(crate) record_size: u64,
    pub(crate) payload: PayloadSource,
}

/// Progress callback: invoked once per emitted record block with the number
/// of entries that block contains. Accumulate on the caller side; the
/// running total is monotonic.
pub type ProgressFn<'a> = &'a mut dyn FnMut(usize);

/// The container writer.
pub struct MdictWriter {
    config: WriterConfig,
    offset_table: Vec<OffsetEntry>,
    total_record_len: u64,
}

impl MdictWriter {
    /// Builds a writer over `entries` with the default comparator for the
    /// configured shape (punctuation-stripping for text, exact for binary).
    ///
    /// Validation happens here: an empty entry set, an empty key, or an
    /// unresolvable payload source is rejected before any bytes are
    /// written.
    pub fn new(entries: Vec<Entry>, config: WriterConfig) -> Result<Self> {
        let collator = MdictCollator::new(!config.is_mdd);
        Self::with_collator(entries, config, &collator)
    }

    /// Like [`MdictWriter::new`] with an explicit comparator.
    ///
    /// The comparator decides on-disk key order; readers must search with
    /// the same order.
    pub fn with_collator(
        mut entries: Vec<Entry>,
        config: WriterConfig,
        collator: &dyn Collation,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(MdictError::Validation("no entries to write".to_string()));
        }
        for entry in &entries {
            if entry.key.is_empty() {
                return Err(MdictError::Validation("entry with empty key".to_string()));
            }
            entry.payload.validate(&entry.key)?;
        }

        // Stable sort: duplicates keep their insertion order.
        entries.sort_by(|a, b| collator.cmp_keys(&a.key, &b.key));

        let key_encoding = if config.is_mdd { UTF_16LE } else { config.encoding };
        // Text records carry one encoded NUL terminator; binary records none.
        let terminator_len = if config.is_mdd {
            0
        } else {
            utils::nul_bytes(config.encoding).len() as u64
        };

        let mut offset_table = Vec::with_capacity(entries.len());
        let mut offset = 0u64;
        for entry in entries {
            let key_bytes = utils::encode_text(&entry.key, key_encoding)?;
            let key_len_units = (key_bytes.len() / utils::unit_width(key_encoding)) as u64;
            let mut key_null = key_bytes;
            key_null.extend_from_slice(utils::nul_bytes(key_encoding));

            let record_size = entry.payload.declared_len() + terminator_len;
            offset_table.push(OffsetEntry {
                key: entry.key,
                key_null,
                key_len_units,
                offset,
                record_size,
                payload: entry.payload,
            });
            offset += record_size;
        }

        info!(
            "Offset table built: {} entries, {} payload bytes",
            offset_table.len(),
            offset
        );

        Ok(Self {
            config,
            offset_table,
            total_record_len: offset,
        })
    }

    pub fn num_entries(&self) -> u64 {
        self.offset_table.len() as u64
    }

    /// Serializes the container to `out`.
    pub fn write<W: Write + Seek>(&self, out: &mut W) -> Result<()> {
        self.write_with_progress(out, &mut |_| {})
    }

    /// Serializes the container, reporting progress once per record block.
    pub fn write_with_progress<W: Write + Seek>(
        &self,
        out: &mut W,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        self.write_header(out)?;
        self.write_key_section(out)?;
        self.write_record_section(out, progress)?;
        out.flush()?;
        Ok(())
    }

    /// Convenience: creates `path` and writes the container through a
    /// buffered handle.
    pub fn write_to_path(&self, path: impl AsRef<Path>, progress: ProgressFn<'_>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut out = BufWriter::new(file);
        self.write_with_progress(&mut out, progress)?;
        out.into_inner().map_err(|e| MdictError::Io(e.into_error()))?;
        Ok(())
    }

    fn write_header<W: Write>(&self, out: &mut W) -> Result<()> {
        let encoding_label = if self.config.encoding == UTF_16LE {
            "UTF-16".to_string()
        } else {
            self.config.encoding.name().to_string()
        };
        header::write(
            out,
            &header::HeaderSpec {
                version: self.config.version,
                encoding_label: &encoding_label,
                title: &self.config.title,
                description: &self.config.description,
                stylesheet: &self.config.stylesheet,
                is_mdd: self.config.is_mdd,
                creation_date: self.config.creation_date.as_deref(),
            },
        )
    }

    /// Emits the key section: info fields, the (compressed in 2.0) key
    /// index, then the key blocks.
    fn write_key_section<W: Write>(&self, out: &mut W) -> Result<()> {
        let version = self.config.version;
        let width = version.number_width();

        let ranges = blocks::split_ranges(
            &self.offset_table,
            SizedEntryCodec::Key {
                number_width: width,
            },
            self.config.key_block_size,
        );
        debug!("Key section: {} blocks", ranges.len());

        let mut index_plain: Vec<u8> = Vec::new();
        let mut key_blocks: Vec<Vec<u8>> = Vec::with_capacity(ranges.len());

        for range in &ranges {
            let entries = &self.offset_table[range.clone()];

            let mut payload = Vec::new();
            for e in entries {
                utils::write_number(&mut payload, e.offset, width)?;
                payload.extend_from_slice(&e.key_null);
            }
            let block = content::encode_block(&payload, self.config.compression)?;

            let first = &entries[0];
            let last = &entries[entries.len() - 1];
            utils::write_number(&mut index_plain, entries.len() as u64, width)?;
            self.write_index_text(&mut index_plain, first)?;
            self.write_index_text(&mut index_plain, last)?;
            utils::write_number(&mut index_plain, block.len() as u64, width)?;
            utils::write_number(&mut index_plain, payload.len() as u64, width)?;

            key_blocks.push(block);
        }

        let key_blocks_len: u64 = key_blocks.iter().map(|b| b.len() as u64).sum();

        // Legacy regime stores the index raw; 2.0 wraps it in a physical block.
        let index_bytes = match version {
            MdictVersion::V1 => index_plain.clone(),
            MdictVersion::V2 => content::encode_block(&index_plain, self.config.compression)?,
        };

        let mut info: Vec<u8> = Vec::new();
        utils::write_number(&mut info, ranges.len() as u64, width)?;
        utils::write_number(&mut info, self.num_entries(), width)?;
        if version == MdictVersion::V2 {
            utils::write_number(&mut info, index_plain.len() as u64, width)?;
        }
        utils::write_number(&mut info, index_bytes.len() as u64, width)?;
        utils::write_number(&mut info, key_blocks_len, width)?;

        out.write_all(&info)?;
        if version == MdictVersion::V2 {
            let checksum = adler2::adler32_slice(&info);
            out.write_all(&checksum.to_be_bytes())?;
        }
        out.write_all(&index_bytes)?;
        for block in &key_blocks {
            out.write_all(block)?;
        }
        Ok(())
    }

    /// One length-prefixed key text in the key index: the unit count, the
    /// key bytes, and (2.0 regime) the terminator.
    fn write_index_text<W: Write>(&self, out: &mut W, entry: &OffsetEntry) -> Result<()> {
        let version = self.config.version;
        utils::write_small_number(out, entry.key_len_units, version.small_number_width())?;
        match version {
            MdictVersion::V1 => {
                let key_encoding = if self.config.is_mdd { UTF_16LE } else { self.config.encoding };
                let terminator = utils::nul_bytes(key_encoding).len();
                out.write_all(&entry.key_null[..entry.key_null.len() - terminator])?;
            }
            MdictVersion::V2 => out.write_all(&entry.key_null)?,
        }
        Ok(())
    }

    /// Emits the record section. The four info fields and the block index
    /// are back-patched once every block has been compressed and streamed,
    /// so payloads are resolved one block at a time.
    fn write_record_section<W: Write + Seek>(
        &self,
        out: &mut W,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        let width = self.config.version.number_width();
        let ranges = blocks::split_ranges(
            &self.offset_table,
            SizedEntryCodec::Record,
            self.config.record_block_size,
        );
        debug!("Record section: {} blocks", ranges.len());

        let section_start = out.stream_position()?;
        for _ in 0..4 {
            utils::write_number(out, 0, width)?;
        }
        for _ in 0..ranges.len() * 2 {
            utils::write_number(out, 0, width)?;
        }

        let terminator: &[u8] = if self.config.is_mdd {
            &[]
        } else {
            utils::nul_bytes(self.config.encoding)
        };

        let mut sources = SourceSet::new();
        let mut index_entries: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
        let mut blocks_total_size = 0u64;

        for range in &ranges {
            let entries = &self.offset_table[range.clone()];
            let expected: u64 = entries.iter().map(|e| e.record_size).sum();

            let mut payload = Vec::with_capacity(expected as usize);
            for e in entries {
                payload.extend_from_slice(&sources.resolve(&e.payload)?);
                payload.extend_from_slice(terminator);
            }
            if payload.len() as u64 != expected {
                return Err(MdictError::SizeMismatch {
                    context: "record block payload".to_string(),
                    expected,
                    found: payload.len() as u64,
                });
            }

            let block = content::encode_block(&payload, self.config.compression)?;
            out.write_all(&block)?;
            blocks_total_size += block.len() as u64;
            index_entries.push((block.len() as u64, payload.len() as u64));
            progress(entries.len());
        }

        // Back-patch the real info fields and block index.
        let end_pos = out.stream_position()?;
        out.seek(SeekFrom::Start(section_start))?;
        utils::write_number(out, ranges.len() as u64, width)?;
        utils::write_number(out, self.num_entries(), width)?;
        utils::write_number(out, (ranges.len() * 2 * width) as u64, width)?;
        utils::write_number(out, blocks_total_size, width)?;
        for (compressed_size, decompressed_size) in &index_entries {
            utils::write_number(out, *compressed_size, width)?;
            utils::write_number(out, *decompressed_size, width)?;
        }
        out.seek(SeekFrom::Start(end_pos))?;

        debug!(
            "Record section written: {} blocks, {} compressed bytes, {} decompressed",
            ranges.len(),
            blocks_total_size,
            self.total_record_len
        );
        Ok(())
    }
}
