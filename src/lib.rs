//! # mdict-pack
//!
//! A reader and writer for MDict dictionary containers: `.mdx` text
//! dictionaries and `.mdd` binary resource archives, format versions 1.x
//! and 2.x, with zlib/LZO/store block compression and read-side decryption
//! support.
//!
//! Reading:
//!
//! ```no_run
//! use mdict_pack::{MdictReader, Mdx};
//!
//! # fn main() -> mdict_pack::Result<()> {
//! let reader = MdictReader::<Mdx>::new("dict.mdx", None, None, true)?;
//! println!("{} ({} entries)", reader.metadata().title, reader.num_entries());
//! for definition in reader.lookup("rose")? {
//!     println!("{definition}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writing:
//!
//! ```no_run
//! use mdict_pack::{Entry, MdictWriter, WriterConfig};
//!
//! # fn main() -> mdict_pack::Result<()> {
//! let entries = vec![
//!     Entry::from_bytes("apple", "A fruit."),
//!     Entry::from_bytes("rose", "A flower."),
//! ];
//! let config = WriterConfig { title: "Demo".into(), ..Default::default() };
//! MdictWriter::new(entries, config)?.write_to_path("demo.mdx", &mut |_| {})?;
//! # Ok(())
//! # }
//! ```
pub mod mdict;

// Re-export the main types for convenience
pub use mdict::{
    collate::{Collation, MdictCollator},
    stylesheet::StyleSheet,
    types::{
        filetypes::{FileType, Mdd, Mdx},
        models::{
            BlockMeta, CompressionType, KeyBlockMeta, KeyEntry, MdictHeader, MdictMetadata,
            MdictVersion, RecordInfo,
        },
    },
    writer::{
        entry::{Entry, PayloadSource, SourceSet},
        WriterConfig,
    },
    MdictError, MdictReader, MdictWriter, Result,
};
