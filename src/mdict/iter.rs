//! Iterators for sequential access to dictionary entries.
//!
//! A layered design with progressive enrichment:
//!
//! 1. [`KeysIterator`] - base iterator yielding `(key, record_offset)` pairs
//! 2. [`RecordInfoIterator`] - adds record location metadata
//! 3. [`RecordIterator`] - fully resolved `(key, record)` pairs with caching
//!
//! Each layer decodes only what it needs, so scanning keys never touches
//! record blocks, and a full record pass decodes each block exactly once.
//! The layering also gives bulk operations a natural cancellation point:
//! stop consuming and no further block is decoded.

use std::iter::Peekable;
use std::vec::IntoIter;

use super::reader::MdictReader;
use super::types::error::{MdictError, Result};
use super::types::filetypes::FileType;
use super::types::models::{KeyEntry, RecordInfo};

/// Iterator over dictionary keys and their cumulative record offsets.
///
/// The lightest-weight iterator: decodes key blocks one at a time and never
/// touches record data. Created by [`MdictReader::iter_keys()`].
pub struct KeysIterator<'a, T: FileType> {
    reader: &'a MdictReader<T>,
    key_block_idx: usize,
    current_keys: IntoIter<KeyEntry>,
}

impl<'a, T: FileType> KeysIterator<'a, T> {
    pub(super) fn new(reader: &'a MdictReader<T>) -> Self {
        Self {
            reader,
            key_block_idx: 0,
            current_keys: Vec::new().into_iter(),
        }
    }

    /// Transforms this iterator to include record location metadata.
    pub fn with_record_info(self) -> RecordInfoIterator<'a, T> {
        RecordInfoIterator {
            reader: self.reader,
            keys_iter: self.peekable(),
            record_block_idx: 0,
            cumulative_offset: 0,
        }
    }
}

impl<'a, T: FileType> Iterator for KeysIterator<'a, T> {
    type Item = Result<(String, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current_keys.next() {
                return Some(Ok((entry.text, entry.id)));
            }

            if self.key_block_idx >= self.reader.num_key_blocks() {
                return None;
            }

            match self.reader.read_key_block_entries(self.key_block_idx) {
                Ok(entries) => {
                    self.current_keys = entries.into_iter();
                    self.key_block_idx += 1;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Iterator over keys with resolved record locations.
///
/// Extends [`KeysIterator`] by resolving each offset to a [`RecordInfo`]
/// describing the containing block and in-block span. Record sizes come
/// from the distance to the next entry's offset; the final entry runs to
/// the end of the decompressed record stream.
///
/// Created by [`KeysIterator::with_record_info()`].
pub struct RecordInfoIterator<'a, T: FileType> {
    keys_iter: Peekable<KeysIterator<'a, T>>,
    reader: &'a MdictReader<T>,
    record_block_idx: usize,
    cumulative_offset: u64,
}

impl<'a, T: FileType> RecordInfoIterator<'a, T> {
    /// Transforms this iterator to include full record data.
    pub fn with_records(self) -> RecordIterator<'a, T> {
        RecordIterator {
            reader: self.reader,
            record_info_iter: self,
            cached_block_index: None,
            cached_block_bytes: Vec::new(),
        }
    }
}

impl<'a, T: FileType> Iterator for RecordInfoIterator<'a, T> {
    type Item = Result<(String, RecordInfo)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key_text, entry_id) = match self.keys_iter.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };

        // Entries arrive in offset order, so the containing block only ever
        // moves forward.
        let record_blocks = self.reader.record_blocks();
        while self.record_block_idx < record_blocks.len() {
            let block = &record_blocks[self.record_block_idx];
            if entry_id < self.cumulative_offset + block.decompressed_size {
                break;
            }
            self.cumulative_offset += block.decompressed_size;
            self.record_block_idx += 1;
        }

        if self.record_block_idx >= record_blocks.len() {
            return Some(Err(MdictError::InvalidFormat(format!(
                "Record offset {} not found in any block",
                entry_id
            ))));
        }

        let next_id = match self.keys_iter.peek() {
            Some(Ok((_, next_id))) => *next_id,
            _ => self.reader.total_record_decomp_size(),
        };

        let record_info = RecordInfo {
            block_index: self.record_block_idx,
            offset_in_block: entry_id - self.cumulative_offset,
            size: next_id - entry_id,
        };

        Some(Ok((key_text, record_info)))
    }
}

/// Iterator over complete dictionary entries with record data.
///
/// Yields `Result<(String, T::Record)>` where `T::Record` is `String` for
/// MDX files and `Vec<u8>` for MDD files.
///
/// # Performance
/// Caches the current decompressed record block, so runs of entries in the
/// same block decode it once.
///
/// Created by [`RecordInfoIterator::with_records()`].
pub struct RecordIterator<'a, T: FileType> {
    record_info_iter: RecordInfoIterator<'a, T>,
    reader: &'a MdictReader<T>,
    cached_block_index: Option<usize>,
    cached_block_bytes: Vec<u8>,
}

impl<'a, T: FileType> Iterator for RecordIterator<'a, T> {
    type Item = Result<(String, T::Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key_text, record_info) = match self.record_info_iter.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };

        if self.cached_block_index != Some(record_info.block_index) {
            match self.reader.read_record_block(record_info.block_index) {
                Ok(bytes) => {
                    self.cached_block_bytes = bytes;
                    self.cached_block_index = Some(record_info.block_index);
                }
                Err(e) => return Some(Err(e)),
            }
        }

        match self.reader.parse_record(&self.cached_block_bytes, &record_info) {
            Ok(record) => Some(Ok((key_text, record))),
            Err(e) => Some(Err(e)),
        }
    }
}
