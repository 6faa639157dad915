//! Entry collection for the writer.
//!
//! Turns on-disk source material into writer [`Entry`] records:
//!
//! - text sources: `</>`-delimited dictionary text (key line, content
//!   lines, terminator line), yielding file-offset payload sources so
//!   content is never loaded during collection;
//! - binary sources: a file or a directory tree, yielding one resource
//!   entry per file with a backslash-separated path key.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::{debug, info};

use super::types::error::{MdictError, Result};
use super::writer::entry::Entry;

/// Collects text entries from a source file, or from every `*.txt` file
/// directly inside a source directory.
///
/// The text format is the classic unpacked shape:
///
/// ```text
/// key
/// content line(s)
/// </>
/// ```
///
/// Blank lines are skipped. Keys are decoded with `encoding`; content stays
/// in the file and is referenced by byte range.
pub fn collect_text_entries(source: &Path, encoding: &'static Encoding) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for file in source_files(source, Some("txt"))? {
        debug!("Scanning text source {}", file.display());
        scan_text_file(&file, encoding, &mut entries)?;
    }
    info!("Collected {} text entries from {}", entries.len(), source.display());
    Ok(entries)
}

/// Collects binary-resource entries from a single file or a directory tree.
///
/// Keys are the MDD convention: a leading backslash plus the path relative
/// to the source root, with backslash separators (`\res\logo.png`).
pub fn collect_resource_entries(source: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let meta = fs::metadata(source)?;
    if meta.is_file() {
        let name = source
            .file_name()
            .ok_or_else(|| MdictError::Validation(format!("{} has no file name", source.display())))?;
        let key = format!("\\{}", name.to_string_lossy());
        entries.push(Entry::from_file_range(key, source, 0, meta.len()));
    } else {
        walk_resources(source, source, &mut entries)?;
    }
    info!("Collected {} resource entries from {}", entries.len(), source.display());
    Ok(entries)
}

fn walk_resources(root: &Path, dir: &Path, entries: &mut Vec<Entry>) -> Result<()> {
    let mut dir_entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    // Deterministic collection order; the writer re-sorts by collation anyway.
    dir_entries.sort_by_key(|e| e.file_name());

    for dir_entry in dir_entries {
        let path = dir_entry.path();
        let file_type = dir_entry.file_type()?;
        if file_type.is_dir() {
            walk_resources(root, &path, entries)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(root).map_err(|_| {
                MdictError::Validation(format!("{} escapes source root", path.display()))
            })?;
            let key = resource_key(rel);
            let size = dir_entry.metadata()?.len();
            entries.push(Entry::from_file_range(key, &path, 0, size));
        }
    }
    Ok(())
}

/// `\`-prefixed key with backslash separators, regardless of host OS.
fn resource_key(rel: &Path) -> String {
    let mut key = String::new();
    for component in rel.components() {
        key.push('\\');
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    key
}

/// The source files to scan: the file itself, or direct children with the
/// given extension.
fn source_files(source: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(source)?;
    if meta.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(source)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| match extension {
            Some(ext) => p.extension().map(|e| e == ext).unwrap_or(false),
            None => true,
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(MdictError::Validation(format!(
            "no source files found in {}",
            source.display()
        )));
    }
    Ok(files)
}

/// Streams one `</>`-delimited file, tracking byte offsets so each entry's
/// payload is a range inside the source file.
fn scan_text_file(
    path: &Path,
    encoding: &'static Encoding,
    entries: &mut Vec<Entry>,
) -> Result<()> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut buf = Vec::new();
    let mut position = 0u64;
    let mut line_no = 0u64;
    let mut key: Option<String> = None;
    let mut content_start = 0u64;
    let mut content_end = 0u64;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        line_no += 1;
        position += n as u64;

        let trimmed = trim_line(&buf);
        if trimmed.is_empty() {
            continue;
        }

        if trimmed == b"</>" {
            let entry_key = key.take().ok_or_else(|| {
                MdictError::Validation(format!(
                    "{}:{}: entry terminator without a key",
                    path.display(),
                    line_no
                ))
            })?;
            if content_end <= content_start {
                return Err(MdictError::Validation(format!(
                    "{}:{}: entry {:?} has no content",
                    path.display(),
                    line_no,
                    entry_key
                )));
            }
            entries.push(Entry::from_file_range(
                entry_key,
                path,
                content_start,
                content_end - content_start,
            ));
        } else if key.is_none() {
            let (decoded, _, had_errors) = encoding.decode(trimmed);
            if had_errors {
                return Err(MdictError::EncodingError {
                    encoding: encoding.name(),
                    context: format!("{}:{}: key is not valid", path.display(), line_no),
                });
            }
            key = Some(decoded.into_owned());
            content_start = position;
            content_end = position;
        } else {
            content_end = position;
        }
    }

    if let Some(dangling) = key {
        return Err(MdictError::Validation(format!(
            "{}: unterminated entry {:?} at end of file",
            path.display(),
            dangling
        )));
    }

    Ok(())
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut slice = line;
    while let Some((&last, rest)) = slice.split_last() {
        if last == b'\n' || last == b'\r' || last == b' ' || last == b'\t' {
            slice = rest;
        } else {
            break;
        }
    }
    while let Some((&first, rest)) = slice.split_first() {
        if first == b' ' || first == b'\t' {
            slice = rest;
        } else {
            break;
        }
    }
    slice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdict::writer::entry::PayloadSource;

    #[test]
    fn text_entries_reference_content_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.txt");
        fs::write(&path, "alpha\r\nFirst definition.\r\n</>\r\nbeta\r\nSecond.\r\nMore.\r\n</>\r\n")
            .unwrap();

        let entries = collect_text_entries(&path, encoding_rs::UTF_8).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "alpha");
        assert_eq!(entries[1].key, "beta");

        match &entries[0].payload {
            PayloadSource::File { pos, size, .. } => {
                let raw = fs::read(&path).unwrap();
                let slice = &raw[*pos as usize..(*pos + *size) as usize];
                assert_eq!(slice, b"First definition.\r\n");
            }
            other => panic!("unexpected payload source {:?}", other),
        }
    }

    #[test]
    fn terminator_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "</>\r\n").unwrap();
        assert!(collect_text_entries(&path, encoding_rs::UTF_8).is_err());
    }

    #[test]
    fn resource_keys_use_backslash_convention() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img/logo.png"), [0u8; 16]).unwrap();
        fs::write(dir.path().join("readme.css"), b"body{}").unwrap();

        let entries = collect_resource_entries(dir.path()).unwrap();
        let mut keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["\\img\\logo.png", "\\readme.css"]);
    }

    #[test]
    fn single_file_resource_gets_basename_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        fs::write(&path, [1u8; 500]).unwrap();
        let entries = collect_resource_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "\\logo.png");
        assert_eq!(entries[0].payload.declared_len(), 500);
    }
}
