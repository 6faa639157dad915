use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use mdict_pack::mdict::collect;
use mdict_pack::mdict::utils::encode_text;
use mdict_pack::{
    CompressionType, Entry, MdictError, MdictReader, MdictVersion, MdictWriter, Mdd, Mdx,
    WriterConfig,
};
use tempfile::TempDir;

fn text_config() -> WriterConfig {
    WriterConfig {
        title: "Round Trip".to_string(),
        description: "generated by tests".to_string(),
        ..Default::default()
    }
}

/// Writes a container into a temp dir and returns its path.
fn write_container(entries: Vec<Entry>, config: WriterConfig, name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(name);
    let writer = MdictWriter::new(entries, config).expect("build writer");
    writer.write_to_path(&path, &mut |_| {}).expect("write container");
    (dir, path)
}

fn open_mdx(path: &PathBuf) -> MdictReader<Mdx> {
    MdictReader::<Mdx>::new(path, None, None, false).expect("open mdx")
}

#[test]
fn end_to_end_text_scenario() {
    let entries = vec![
        Entry::from_bytes("apple", "A fruit."),
        Entry::from_bytes("Apple Pie", "A dessert."),
    ];
    let (_dir, path) = write_container(entries, text_config(), "basic.mdx");

    let reader = open_mdx(&path);
    assert_eq!(reader.num_entries(), 2);
    assert!(!reader.metadata().is_mdd);
    assert_eq!(reader.metadata().title, "Round Trip");
    assert_eq!(reader.metadata().engine_version, "2.0");

    // Case is preserved; order follows the collation ("apple" < "applepie").
    let keys: Vec<String> = reader
        .iter_keys()
        .map(|r| r.expect("key ok").0)
        .collect();
    assert_eq!(keys, vec!["apple", "Apple Pie"]);

    assert_eq!(reader.lookup("apple").expect("lookup"), vec!["A fruit."]);
    assert_eq!(reader.lookup("Apple Pie").expect("lookup"), vec!["A dessert."]);
    assert!(reader.lookup("pear").expect("lookup miss").is_empty());
}

#[test]
fn duplicate_keys_preserve_write_order() {
    let entries = vec![
        Entry::from_bytes("zinnia", "Another flower."),
        Entry::from_bytes("rose", "A"),
        Entry::from_bytes("aster", "Yet another."),
        Entry::from_bytes("rose", "B"),
    ];
    let (_dir, path) = write_container(entries, text_config(), "dup.mdx");

    let reader = open_mdx(&path);
    assert_eq!(reader.lookup("rose").expect("lookup"), vec!["A", "B"]);
}

#[test]
fn multi_block_round_trip_and_offsets() {
    let mut entries = Vec::new();
    let mut expected: HashMap<String, Vec<String>> = HashMap::new();
    for i in 0..300u32 {
        let key = format!("key-{:03}", i);
        let body = format!("definition {} {}", i, "x".repeat((i % 37) as usize));
        entries.push(Entry::from_bytes(&key, body.as_bytes()));
        expected.entry(key).or_default().push(body);
    }

    let config = WriterConfig {
        key_block_size: 256,
        record_block_size: 512,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "multi.mdx");

    let reader = open_mdx(&path);
    assert_eq!(reader.num_entries(), 300);
    assert!(reader.num_key_blocks() > 1, "expected multiple key blocks");
    assert!(reader.num_record_blocks() > 1, "expected multiple record blocks");

    // Offsets are cumulative and strictly monotonic for non-empty records.
    let keys: Vec<(String, u64)> = reader.iter_keys().map(|r| r.expect("key ok")).collect();
    assert_eq!(keys.len(), 300);
    for win in keys.windows(2) {
        assert!(win[0].1 < win[1].1, "non-monotonic offset");
    }

    // Block budgets hold pre-compression: every multi-entry block stays
    // within its configured budget.
    for block in reader.key_blocks() {
        assert!(
            block.meta.decompressed_size <= 256 || block.entry_count == 1,
            "key block over budget: {} bytes, {} entries",
            block.meta.decompressed_size,
            block.entry_count
        );
    }
    for block in reader.record_blocks() {
        assert!(
            block.decompressed_size <= 512,
            "record block over budget: {} bytes",
            block.decompressed_size
        );
    }

    // Full-content round trip.
    let mut actual: HashMap<String, Vec<String>> = HashMap::new();
    for result in reader.iter_records() {
        let (key, body) = result.expect("record ok");
        actual.entry(key).or_default().push(body);
    }
    assert_eq!(actual, expected);

    // Random access agrees with iteration.
    assert_eq!(
        reader.lookup("key-123").expect("lookup"),
        expected["key-123"]
    );
    assert_eq!(
        reader.lookup("key-299").expect("lookup last"),
        expected["key-299"]
    );
}

#[test]
fn flipped_payload_byte_fails_with_checksum_mismatch() {
    let entries = vec![
        Entry::from_bytes("alpha", "first body"),
        Entry::from_bytes("beta", "second body"),
    ];
    // Store method: a flipped byte keeps sizes valid, so the checksum is
    // the layer that must catch it.
    let config = WriterConfig {
        compression: CompressionType::None,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "corrupt.mdx");

    // The file ends with the last record block's payload.
    let mut bytes = fs::read(&path).expect("read container");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).expect("rewrite container");

    let reader = open_mdx(&path);
    match reader.lookup("beta") {
        Err(MdictError::ChecksumMismatch { .. }) => {}
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
    // The key section is intact, so the container stays open and keys still
    // enumerate.
    let keys: Vec<String> = reader.iter_keys().map(|r| r.expect("key ok").0).collect();
    assert_eq!(keys, vec!["alpha", "beta"]);
}

#[test]
fn binary_resource_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resource_path = dir.path().join("logo.png");
    let payload: Vec<u8> = (0..500u32).map(|i| (i * 7 % 251) as u8).collect();
    fs::write(&resource_path, &payload).expect("write resource");

    let entries = collect::collect_resource_entries(&resource_path).expect("collect");
    let config = WriterConfig {
        title: "Resources".to_string(),
        is_mdd: true,
        ..Default::default()
    };
    let target = dir.path().join("resources.mdd");
    MdictWriter::new(entries, config)
        .expect("build writer")
        .write_to_path(&target, &mut |_| {})
        .expect("write mdd");

    let reader = MdictReader::<Mdd>::new(&target, None, None, false).expect("open mdd");
    assert!(reader.metadata().is_mdd);
    assert_eq!(reader.num_entries(), 1);

    let records = reader.lookup("\\logo.png").expect("lookup resource");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], payload, "resource bytes must survive unmodified");
}

#[test]
fn width_regime_follows_declared_version() {
    let entries = || {
        vec![
            Entry::from_bytes("one", "first"),
            Entry::from_bytes("two", "second"),
            Entry::from_bytes("three", "third"),
        ]
    };
    let store = |version| WriterConfig {
        version,
        compression: CompressionType::None,
        ..text_config()
    };

    let (_d1, v2_path) = write_container(entries(), store(MdictVersion::V2), "v2.mdx");
    let (_d2, v1_path) = write_container(entries(), store(MdictVersion::V1), "v1.mdx");

    let v2 = open_mdx(&v2_path);
    let v1 = open_mdx(&v1_path);
    assert_eq!(v2.metadata().engine_version, "2.0");
    assert_eq!(v1.metadata().engine_version, "1.2");
    assert_eq!(v2.num_entries(), 3);
    assert_eq!(v1.num_entries(), 3);

    for reader in [&v1, &v2] {
        assert_eq!(reader.lookup("two").expect("lookup"), vec!["second"]);
        let keys: Vec<String> = reader.iter_keys().map(|r| r.expect("key ok").0).collect();
        assert_eq!(keys, vec!["one", "three", "two"]);
    }

    // Same content, uncompressed: the 64-bit regime is strictly larger on
    // disk because every section field doubles in width.
    let v1_len = fs::metadata(&v1_path).expect("v1 meta").len();
    let v2_len = fs::metadata(&v2_path).expect("v2 meta").len();
    assert!(v2_len > v1_len, "expected v2 ({}) > v1 ({})", v2_len, v1_len);
}

#[test]
fn utf16_container_round_trip() {
    let encoding = encoding_rs::UTF_16LE;
    let entries = vec![
        Entry::from_bytes("中文", encode_text("中文释义", encoding).expect("encode")),
        Entry::from_bytes("café", encode_text("with accent", encoding).expect("encode")),
    ];
    let config = WriterConfig {
        encoding,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "utf16.mdx");

    let reader = open_mdx(&path);
    assert_eq!(reader.header.encoding, encoding);
    assert_eq!(reader.lookup("中文").expect("lookup"), vec!["中文释义"]);
    assert_eq!(reader.lookup("café").expect("lookup"), vec!["with accent"]);
}

#[test]
fn gb18030_container_round_trip() {
    let encoding = encoding_rs::GB18030;
    let entries = vec![Entry::from_bytes(
        "重复",
        encode_text("汉字内容", encoding).expect("encode"),
    )];
    let config = WriterConfig {
        encoding,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "gbk.mdx");

    let reader = open_mdx(&path);
    assert_eq!(reader.lookup("重复").expect("lookup"), vec!["汉字内容"]);
}

#[cfg(feature = "lzo")]
#[test]
fn lzo_container_round_trip() {
    let entries = vec![
        Entry::from_bytes("legacy", "compressed with the legacy method"),
        Entry::from_bytes("modern", "still readable"),
    ];
    let config = WriterConfig {
        compression: CompressionType::Lzo,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "lzo.mdx");

    let reader = open_mdx(&path);
    assert_eq!(
        reader.lookup("legacy").expect("lookup"),
        vec!["compressed with the legacy method"]
    );
}

#[test]
fn stylesheet_markers_expand_only_when_enabled() {
    let entries = vec![Entry::from_bytes("styled", "`1`bold text`2`emphasis")];
    let config = WriterConfig {
        stylesheet: "1\n<b>\n</b>\n2\n<i>\n</i>".to_string(),
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "styled.mdx");

    let plain = MdictReader::<Mdx>::new(&path, None, None, false).expect("open plain");
    let raw = &plain.lookup("styled").expect("lookup")[0];
    assert!(raw.contains('`'), "markers must stay raw when substyle is off");

    let styled = MdictReader::<Mdx>::new(&path, None, None, true).expect("open styled");
    let body = &styled.lookup("styled").expect("lookup")[0];
    assert_eq!(body, "<b>bold text</b><i>emphasis</i>");
}

#[test]
fn progress_reports_accumulate_to_entry_count() {
    let entries: Vec<Entry> = (0..64)
        .map(|i| Entry::from_bytes(format!("key{:02}", i), format!("body {}", i)))
        .collect();
    let config = WriterConfig {
        record_block_size: 128,
        ..text_config()
    };

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("progress.mdx");
    let writer = MdictWriter::new(entries, config).expect("build writer");

    let mut reports = Vec::new();
    writer
        .write_to_path(&path, &mut |n| reports.push(n))
        .expect("write");

    assert!(reports.len() > 1, "expected one report per record block");
    assert_eq!(reports.iter().sum::<usize>(), 64);
    assert!(reports.iter().all(|&n| n > 0));

    let reader = open_mdx(&path);
    assert_eq!(reports.len(), reader.num_record_blocks());
}

#[test]
fn writer_rejects_invalid_input() {
    match MdictWriter::new(Vec::new(), text_config()) {
        Err(MdictError::Validation(_)) => {}
        other => panic!("expected validation error for empty set, got {:?}", other.map(|_| ())),
    }

    let entries = vec![Entry::from_bytes("", "body")];
    match MdictWriter::new(entries, text_config()) {
        Err(MdictError::Validation(_)) => {}
        other => panic!("expected validation error for empty key, got {:?}", other.map(|_| ())),
    }

    let entries = vec![Entry::from_file_range("ghost", "/nonexistent/path", 0, 4)];
    match MdictWriter::new(entries, text_config()) {
        Err(MdictError::Validation(_)) => {}
        other => panic!("expected validation error for bad source, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn text_source_packs_and_unpacks_through_file_ranges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("dict.txt");
    fs::write(
        &source,
        "alpha\r\nFirst definition.\r\n</>\r\nbeta\r\nSecond one.\r\nWith a second line.\r\n</>\r\n",
    )
    .expect("write source");

    let entries = collect::collect_text_entries(&source, encoding_rs::UTF_8).expect("collect");
    assert_eq!(entries.len(), 2);

    let target = dir.path().join("dict.mdx");
    MdictWriter::new(entries, text_config())
        .expect("build writer")
        .write_to_path(&target, &mut |_| {})
        .expect("write");

    let reader = open_mdx(&target);
    let alpha = reader.lookup("alpha").expect("lookup alpha");
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].trim_end(), "First definition.");

    let beta = reader.lookup("beta").expect("lookup beta");
    assert_eq!(beta[0].trim_end(), "Second one.\r\nWith a second line.");
}

#[test]
fn invalid_payload_encoding_surfaces_as_encoding_error() {
    // 0xC3 alone is a truncated UTF-8 sequence.
    let entries = vec![Entry::from_bytes("broken", vec![0x62, 0x61, 0xC3])];
    let (_dir, path) = write_container(entries, text_config(), "broken.mdx");

    let reader = open_mdx(&path);
    match reader.lookup("broken") {
        Err(MdictError::EncodingError { .. }) => {}
        other => panic!("expected encoding error, got {:?}", other),
    }
}

#[test]
fn span_reads_support_the_to_end_sentinel() {
    let entries = vec![
        Entry::from_bytes("first", "alpha body"),
        Entry::from_bytes("second", "omega body"),
    ];
    let (_dir, path) = write_container(entries, text_config(), "span.mdx");

    let reader = open_mdx(&path);
    let keys: Vec<(String, u64)> = reader.iter_keys().map(|r| r.expect("key ok")).collect();
    let (_, first_offset) = &keys[0];
    let (_, second_offset) = &keys[1];

    // Exact span.
    let exact = reader
        .read_record_span(*first_offset, (*second_offset - *first_offset) as i64)
        .expect("exact span");
    assert_eq!(exact, "alpha body");

    // Non-positive length runs to the end of the containing block and still
    // trims the terminator.
    let to_end = reader.read_record_span(*second_offset, -1).expect("sentinel span");
    assert_eq!(to_end, "omega body");
}

#[test]
fn duplicates_spanning_key_blocks_are_all_found() {
    // Tiny key budget: each key block holds a single entry, so the three
    // duplicates land in three different blocks.
    let entries = vec![
        Entry::from_bytes("dup", "one"),
        Entry::from_bytes("dup", "two"),
        Entry::from_bytes("dup", "three"),
        Entry::from_bytes("zz", "tail"),
    ];
    let config = WriterConfig {
        key_block_size: 1,
        record_block_size: 8,
        ..text_config()
    };
    let (_dir, path) = write_container(entries, config, "spanning.mdx");

    let reader = open_mdx(&path);
    assert!(reader.num_key_blocks() >= 4);
    assert_eq!(
        reader.lookup("dup").expect("lookup"),
        vec!["one", "two", "three"]
    );
    assert_eq!(reader.lookup("zz").expect("lookup"), vec!["tail"]);
}
