//! Size-bounded block splitting.
//!
//! The writer partitions the collation-ordered offset table twice: once
//! into key blocks (bounded by the key budget) and once into record blocks
//! (bounded by the record budget). The two partitionings are independent
//! and need not align block-for-block.
//!
//! Key and record blocks differ only in how an entry's encoded size is
//! measured, so a single splitter runs over a tagged entry codec instead of
//! two specialized block types.

use std::ops::Range;

use super::OffsetEntry;

/// How one entry contributes to a block's pre-compression size.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SizedEntryCodec {
    /// Key blocks: a number-width offset plus the NUL-terminated key bytes.
    Key { number_width: usize },
    /// Record blocks: the payload bytes (terminator included for text).
    Record,
}

impl SizedEntryCodec {
    pub(crate) fn encoded_len(&self, entry: &OffsetEntry) -> u64 {
        match self {
            SizedEntryCodec::Key { number_width } => {
                *number_width as u64 + entry.key_null.len() as u64
            }
            SizedEntryCodec::Record => entry.record_size,
        }
    }
}

/// Greedy, order-preserving partition of the offset table.
///
/// Accumulates entries while the running encoded size stays within
/// `budget`; an entry that would push past the budget closes the current
/// block first. A single entry larger than the whole budget gets a block
/// of its own. Never reorders entries; every entry lands in exactly one
/// block.
pub(crate) fn split_ranges(
    table: &[OffsetEntry],
    codec: SizedEntryCodec,
    budget: u64,
) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut block_start = 0usize;
    let mut block_size = 0u64;

    for (i, entry) in table.iter().enumerate() {
        let entry_size = codec.encoded_len(entry);
        if block_size > 0 && block_size + entry_size > budget {
            ranges.push(block_start..i);
            block_start = i;
            block_size = 0;
        }
        block_size += entry_size;
    }
    if block_start < table.len() {
        ranges.push(block_start..table.len());
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdict::writer::entry::PayloadSource;

    fn entry(key_null_len: usize, record_size: u64) -> OffsetEntry {
        OffsetEntry {
            key: String::new(),
            key_null: vec![0; key_null_len],
            key_len_units: 0,
            offset: 0,
            record_size,
            payload: PayloadSource::Bytes(Vec::new()),
        }
    }

    #[test]
    fn entries_accumulate_until_budget() {
        let table: Vec<_> = (0..6).map(|_| entry(0, 10)).collect();
        let ranges = split_ranges(&table, SizedEntryCodec::Record, 30);
        assert_eq!(ranges, vec![0..3, 3..6]);
    }

    #[test]
    fn oversized_entry_forms_its_own_block() {
        let table = vec![entry(0, 10), entry(0, 100), entry(0, 10)];
        let ranges = split_ranges(&table, SizedEntryCodec::Record, 30);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn all_entries_are_covered_in_order() {
        let table: Vec<_> = (0..17).map(|i| entry(0, (i % 5) + 1)).collect();
        let ranges = split_ranges(&table, SizedEntryCodec::Record, 7);
        let mut covered = 0;
        for r in &ranges {
            assert_eq!(r.start, covered);
            covered = r.end;
        }
        assert_eq!(covered, table.len());
        for r in &ranges {
            let size: u64 = table[r.clone()].iter().map(|e| e.record_size).sum();
            assert!(size <= 7 || r.len() == 1, "over-budget multi-entry block");
        }
    }

    #[test]
    fn key_codec_counts_offset_field_and_key_bytes() {
        let table = vec![entry(6, 0), entry(6, 0)];
        // each entry costs 8 + 6 = 14; budget 20 fits only one
        let ranges = split_ranges(&table, SizedEntryCodec::Key { number_width: 8 }, 20);
        assert_eq!(ranges, vec![0..1, 1..2]);
    }
}
