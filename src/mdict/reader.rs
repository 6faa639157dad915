//! High-level container reader.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;

use super::collate::{Collation, MdictCollator};
use super::format::{content, header, index};
use super::iter::{KeysIterator, RecordIterator};
use super::stylesheet::StyleSheet;
use super::types::error::{MdictError, Result};
use super::types::filetypes::FileType;
use super::types::models::*;

/// The main reader for MDict dictionary containers.
///
/// Opens both `.mdx` (text) and `.mdd` (binary resource) files. Opening
/// parses the header and the two section indexes eagerly; key and record
/// blocks are decoded lazily, one block at a time, per lookup or iteration
/// pass.
pub struct MdictReader<T: FileType> {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    pub header: MdictHeader,

    key_blocks: Vec<KeyBlockMeta>,
    record_blocks: Vec<BlockMeta>,
    total_record_decomp_size: u64,
    num_entries: u64,

    stylesheet: Option<StyleSheet>,
    collator: Box<dyn Collation>,
    _file_type: PhantomData<T>,
}

impl<T: FileType> MdictReader<T> {
    /// Opens a container.
    ///
    /// Priority for the text encoding (highest → lowest):
    /// 1. `T::ENCODING_OVERRIDE` (MDD always uses UTF-16LE)
    /// 2. `user_encoding` (explicit caller/CLI override)
    /// 3. the encoding declared in the header
    ///
    /// `passcode` is `(regcode_hex, user_email)` for encrypted foreign
    /// files. `substyle` enables stylesheet marker expansion on text
    /// records when the header carries a stylesheet.
    pub fn new(
        path: impl AsRef<Path>,
        passcode: Option<(&str, &str)>,
        user_encoding: Option<&str>,
        substyle: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening {} file: {}", T::DEBUG_NAME, path.display());
        let mut file = File::open(path)?;

        let mut mdict_header = header::parse(&mut file, passcode)?;

        let final_encoding = T::ENCODING_OVERRIDE
            .or_else(|| user_encoding.map(super::utils::parse_encoding))
            .unwrap_or(mdict_header.encoding);
        if mdict_header.encoding != final_encoding {
            info!(
                "Text encoding overridden: header='{}', final='{}'",
                mdict_header.encoding.name(),
                final_encoding.name()
            );
        }
        mdict_header.encoding = final_encoding;

        let parsed = index::parse(&mut file, &mdict_header)?;

        let stylesheet = if substyle {
            mdict_header
                .metadata
                .stylesheet_raw
                .as_deref()
                .map(StyleSheet::parse)
                .filter(|s| !s.is_empty())
        } else {
            None
        };

        let collator = Box::new(MdictCollator::new(mdict_header.metadata.strip_key));

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            header: mdict_header,
            key_blocks: parsed.key_blocks,
            record_blocks: parsed.record_blocks,
            total_record_decomp_size: parsed.total_record_decomp_size,
            num_entries: parsed.num_entries,
            stylesheet,
            collator,
            _file_type: PhantomData,
        })
    }

    /// Replaces the comparator used for block binary search.
    ///
    /// Only needed when reading a container that was sorted with a
    /// non-default collation; the substitute must match the writer's order
    /// or lookups will miss.
    pub fn with_collator(mut self, collator: Box<dyn Collation>) -> Self {
        self.collator = collator;
        self
    }

    /// Path this container was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// User-visible header metadata.
    pub fn metadata(&self) -> &MdictMetadata {
        &self.header.metadata
    }

    /// Total number of entries, known from the section indexes (O(1)).
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn num_key_blocks(&self) -> usize {
        self.key_blocks.len()
    }

    pub fn num_record_blocks(&self) -> usize {
        self.record_blocks.len()
    }

    /// Total decompressed size of the record section.
    pub fn total_record_decomp_size(&self) -> u64 {
        self.total_record_decomp_size
    }

    /// Per-block record metadata, in file order.
    pub fn record_blocks(&self) -> &[BlockMeta] {
        &self.record_blocks
    }

    /// Per-block key metadata, in file order.
    pub fn key_blocks(&self) -> &[KeyBlockMeta] {
        &self.key_blocks
    }

    /// Returns the base iterator over all `(key_text, record_offset)` pairs.
    ///
    /// This is the lightest way to scan all keys: it decodes key blocks one
    /// at a time and never touches record blocks. Restart by calling it
    /// again. Chain with `.with_record_info()` and `.with_records()` for
    /// richer items.
    pub fn iter_keys(&self) -> KeysIterator<'_, T> {
        KeysIterator::new(self)
    }

    /// Iterator over all `(key, record)` pairs.
    ///
    /// Shortcut for `iter_keys().with_record_info().with_records()`; record
    /// blocks are decoded lazily and cached one at a time, so a full pass
    /// decodes each block exactly once.
    pub fn iter_records(&self) -> RecordIterator<'_, T> {
        self.iter_keys().with_record_info().with_records()
    }

    /// Finds every record stored under `key`, in write order.
    ///
    /// Duplicate keys are legitimate; the result holds one record per
    /// duplicate. Returns an empty vector when the key is absent.
    pub fn lookup(&self, key: &str) -> Result<Vec<T::Record>> {
        self.lookup_locations(key)?
            .iter()
            .map(|info| self.read_record(info))
            .collect()
    }

    /// Finds the record locations for `key` without decoding record blocks.
    ///
    /// Binary-searches the key-block summaries under the collation order,
    /// decodes only the candidate blocks, and matches entries exactly.
    pub fn lookup_locations(&self, key: &str) -> Result<Vec<RecordInfo>> {
        if self.key_blocks.is_empty() {
            return Ok(Vec::new());
        }

        // Leftmost block whose last key is not before the query; identical
        // keys are adjacent, so candidates form a contiguous block run.
        let start = self
            .key_blocks
            .partition_point(|b| self.collator.cmp_keys(&b.last_key, key) == Ordering::Less);

        let mut matched_ids: Vec<u64> = Vec::new();
        let mut next_after_last: Option<u64> = None;
        let mut last_scanned = start;

        for idx in start..self.key_blocks.len() {
            let block = &self.key_blocks[idx];
            if self.collator.cmp_keys(&block.first_key, key) == Ordering::Greater {
                break;
            }
            last_scanned = idx;
            let entries = self.read_key_block_entries(idx)?;
            for (i, entry) in entries.iter().enumerate() {
                if entry.text == key {
                    matched_ids.push(entry.id);
                    next_after_last = entries.get(i + 1).map(|n| n.id);
                } else if !matched_ids.is_empty() && next_after_last.is_none() {
                    next_after_last = Some(entry.id);
                }
            }
        }

        if matched_ids.is_empty() {
            return Ok(Vec::new());
        }

        // A match that ended a block needs the next block's first offset to
        // size itself; the very last entry runs to the end of the stream.
        if next_after_last.is_none() && last_scanned + 1 < self.key_blocks.len() {
            next_after_last = self
                .read_key_block_entries(last_scanned + 1)?
                .first()
                .map(|e| e.id);
        }

        let mut locations = Vec::with_capacity(matched_ids.len());
        for (j, &id) in matched_ids.iter().enumerate() {
            let next_id = matched_ids
                .get(j + 1)
                .copied()
                .or(next_after_last)
                .unwrap_or(self.total_record_decomp_size);
            locations.push(self.get_record_info(id, next_id)?);
        }
        Ok(locations)
    }

    /// Resolves a cumulative record offset to its containing block.
    ///
    /// Binary search over the record-block index; `next_id` bounds the
    /// record's size.
    pub fn get_record_info(&self, id: u64, next_id: u64) -> Result<RecordInfo> {
        let (block_index, block) = self.locate_block(id)?;
        Ok(RecordInfo {
            block_index,
            offset_in_block: id - block.decompressed_offset,
            size: next_id.saturating_sub(id),
        })
    }

    /// The record block containing the given cumulative offset.
    pub fn find_block_by_offset(&self, offset: u64) -> Result<&BlockMeta> {
        self.locate_block(offset).map(|(_, block)| block)
    }

    fn locate_block(&self, offset: u64) -> Result<(usize, &BlockMeta)> {
        if self.record_blocks.is_empty() {
            return Err(MdictError::InvalidFormat("No record blocks available".to_string()));
        }
        let block_index = self
            .record_blocks
            .partition_point(|b| b.decompressed_offset <= offset)
            .checked_sub(1)
            .ok_or_else(|| {
                MdictError::InvalidFormat(format!("Record offset {} is out of bounds", offset))
            })?;
        let block = &self.record_blocks[block_index];
        if offset >= block.decompressed_offset + block.decompressed_size {
            return Err(MdictError::InvalidFormat(format!(
                "Record offset {} exceeds block bounds",
                offset
            )));
        }
        Ok((block_index, block))
    }

    /// Reads, decodes, and processes a single record (random access).
    ///
    /// For sequential access prefer the iterators, which cache the current
    /// block.
    pub fn read_record(&self, record_info: &RecordInfo) -> Result<T::Record> {
        let block_bytes = self.read_record_block(record_info.block_index)?;
        self.parse_record(&block_bytes, record_info)
    }

    /// Random access by raw span, mirroring the on-disk contract: a
    /// non-positive `length` means "to the end of the containing block"
    /// (the terminator is still trimmed for text records).
    pub fn read_record_span(&self, offset: u64, length: i64) -> Result<T::Record> {
        let (block_index, block) = self.locate_block(offset)?;
        let offset_in_block = offset - block.decompressed_offset;
        let size = if length > 0 {
            length as u64
        } else {
            block.decompressed_size - offset_in_block
        };
        self.read_record(&RecordInfo {
            block_index,
            offset_in_block,
            size,
        })
    }

    /// Extracts one record from a pre-decoded block's bytes.
    ///
    /// The `RecordIterator` uses this to avoid re-reading a block for
    /// multiple entries.
    pub fn parse_record(&self, block_bytes: &[u8], info: &RecordInfo) -> Result<T::Record> {
        content::parse_record::<T>(block_bytes, info, &self.header, self.stylesheet.as_ref())
    }

    /// Reads and decodes a full record block given its index.
    ///
    /// Public so applications can layer their own block caching on top.
    pub fn read_record_block(&self, block_index: usize) -> Result<Vec<u8>> {
        let meta = self.record_blocks.get(block_index).copied().ok_or_else(|| {
            MdictError::InvalidFormat(format!("Invalid record block index: {}", block_index))
        })?;
        self.read_and_decode_block(meta)
    }

    pub(crate) fn read_key_block_entries(&self, block_index: usize) -> Result<Vec<KeyEntry>> {
        let meta = self
            .key_blocks
            .get(block_index)
            .map(|b| b.meta)
            .ok_or_else(|| {
                MdictError::InvalidFormat(format!("Invalid key block index: {}", block_index))
            })?;
        let decompressed = self.read_and_decode_block(meta)?;
        content::parse_key_entries(&decompressed, &self.header)
    }

    /// Reads a raw block from disk and decodes it.
    fn read_and_decode_block(&self, block_meta: BlockMeta) -> Result<Vec<u8>> {
        let mut raw_block = {
            let mut file = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
            file.seek(SeekFrom::Start(block_meta.file_offset))?;
            let mut buf = vec![0u8; block_meta.compressed_size as usize];
            file.read_exact(&mut buf)?;
            buf
        };

        content::decode_block(
            &mut raw_block,
            block_meta.decompressed_size,
            self.header.master_key.as_ref(),
        )
    }
}
