//! Codec layer for compression and encryption primitives.
//!
//! Pure data transformations with no knowledge of the container layout:
//!
//! - [`compression`]: the three block methods (store, LZO, Zlib), both directions
//! - [`crypto`]: read-path decryption (Salsa20/8, fast XOR, key derivation)

pub mod compression;
pub mod crypto;
