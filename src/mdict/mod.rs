//! Core MDict container module.
//!
//! Layered from the bottom up:
//!
//! - [`utils`]: width-selected numbers and text encoding helpers
//! - [`types`]: models, errors, and the MDX/MDD file-type markers
//! - [`codec`]: compression and (read-path) decryption primitives
//! - [`collate`]: the key order shared by writer and reader
//! - [`format`]: header, section indexes, and physical blocks
//! - [`reader`] / [`iter`]: open, inspect, iterate, and look up
//! - [`writer`]: assemble a container from unordered entries
//! - [`collect`] / [`stylesheet`]: source collection and compact-HTML
//!   expansion around the core

pub mod collate;
pub mod collect;
pub mod codec;
pub mod format;
pub mod iter;
pub mod reader;
pub mod stylesheet;
pub mod types;
pub mod utils;
pub mod writer;

pub use reader::MdictReader;
pub use types::error::{MdictError, Result};
pub use writer::MdictWriter;
