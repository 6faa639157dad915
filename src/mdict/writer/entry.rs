//! Writer input: entries and their payload sources.
//!
//! Payload bytes are not materialized until the record section is emitted;
//! an [`Entry`] only declares where its bytes live and how many there are,
//! so block splitting can run over millions of entries without loading any
//! payload.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::mdict::types::error::{MdictError, Result};

/// Where an entry's payload bytes come from.
///
/// The writer depends only on the `declared_len`/`resolve` capability, never
/// on the concrete variant, so alternate sources (a database row, a network
/// fetch) slot in by adding a variant or pre-resolving to `Bytes`.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Literal payload bytes held in memory.
    Bytes(Vec<u8>),
    /// A byte range inside a file, read when the record section is emitted.
    File {
        path: PathBuf,
        pos: u64,
        size: u64,
    },
}

impl PayloadSource {
    /// Payload size in bytes, known without reading the source.
    pub fn declared_len(&self) -> u64 {
        match self {
            PayloadSource::Bytes(bytes) => bytes.len() as u64,
            PayloadSource::File { size, .. } => *size,
        }
    }

    /// Cheap existence/bounds check used by writer validation.
    pub fn validate(&self, key: &str) -> Result<()> {
        if let PayloadSource::File { path, pos, size } = self {
            let meta = std::fs::metadata(path).map_err(|e| {
                MdictError::Validation(format!(
                    "payload source {} for key {:?} is unreadable: {}",
                    path.display(),
                    key,
                    e
                ))
            })?;
            if pos + size > meta.len() {
                return Err(MdictError::Validation(format!(
                    "payload range {}..{} for key {:?} exceeds {} ({} bytes)",
                    pos,
                    pos + size,
                    key,
                    path.display(),
                    meta.len()
                )));
            }
        }
        Ok(())
    }
}

/// One writer input: a key and the source of its payload bytes.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub payload: PayloadSource,
}

impl Entry {
    pub fn new(key: impl Into<String>, payload: PayloadSource) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// An entry with literal payload bytes.
    pub fn from_bytes(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(key, PayloadSource::Bytes(bytes.into()))
    }

    /// An entry backed by a byte range in a file.
    pub fn from_file_range(key: impl Into<String>, path: impl Into<PathBuf>, pos: u64, size: u64) -> Self {
        Self::new(
            key,
            PayloadSource::File {
                path: path.into(),
                pos,
                size,
            },
        )
    }
}

/// A caller-owned resolution session for payload sources.
///
/// Keeps one open handle per referenced file for the duration of a write
/// pass, then drops them all. Owning the handles here (instead of a
/// process-wide registry) keeps write passes independent and reentrant.
#[derive(Debug, Default)]
pub struct SourceSet {
    files: HashMap<PathBuf, File>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a payload source to its bytes.
    pub fn resolve<'a>(&mut self, source: &'a PayloadSource) -> Result<Cow<'a, [u8]>> {
        match source {
            PayloadSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            PayloadSource::File { path, pos, size } => {
                let file = self.open(path)?;
                file.seek(SeekFrom::Start(*pos))?;
                let mut buf = vec![0u8; *size as usize];
                file.read_exact(&mut buf)?;
                Ok(Cow::Owned(buf))
            }
        }
    }

    fn open(&mut self, path: &Path) -> Result<&mut File> {
        use std::collections::hash_map::Entry as MapEntry;
        match self.files.entry(path.to_path_buf()) {
            MapEntry::Occupied(handle) => Ok(handle.into_mut()),
            MapEntry::Vacant(slot) => Ok(slot.insert(File::open(path)?)),
        }
    }
}
