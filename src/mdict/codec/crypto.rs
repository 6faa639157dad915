//! Read-path decryption for encrypted containers.
//!
//! Writers produced by this crate never encrypt, but foreign files may carry
//! two schemes, selected per block by the tag word's encryption nibble:
//! a fast XOR cipher and Salsa20/8 with a 128-bit key. Keys are derived
//! with RIPEMD-128, either from a user passcode or from block checksums.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use ripemd::{Digest, Ripemd128};

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::EncryptionType;

/// Derives the master decryption key from a registration code and user email.
///
/// The email is hashed with RIPEMD-128 and the resulting digest is used as
/// a Salsa20/8 key to decrypt the 16-byte registration code; the decrypted
/// code is the master key.
pub fn derive_master_key(reg_code: &[u8], user_id: &[u8]) -> Result<[u8; 16]> {
    debug!("Deriving master key from registration code and user email");

    let mut hasher = Ripemd128::new();
    hasher.update(user_id);
    let salsa_key: [u8; 16] = hasher.finalize().into();

    let mut master_key_bytes = reg_code.to_vec();
    salsa_decrypt(&mut master_key_bytes, &salsa_key);

    master_key_bytes.try_into().map_err(|_| {
        MdictError::DecryptionError("registration code must be 16 bytes".to_string())
    })
}

/// Derives the decryption key for a v2.x encrypted key index:
/// `RIPEMD-128(checksum_bytes || 0x3695)`, the magic constant fixed by the
/// format.
pub fn derive_key_for_v2_index(key_index_block: &[u8]) -> [u8; 16] {
    trace!("Deriving key for v2.x key index from checksum and magic constant");

    let mut hasher = Ripemd128::new();
    hasher.update(&key_index_block[4..8]);
    hasher.update(0x3695u32.to_le_bytes());
    hasher.finalize().into()
}

/// Decrypts a payload in-place using the method declared in the block tag.
pub fn decrypt_payload_in_place(
    payload: &mut [u8],
    encryption_type: EncryptionType,
    key: &[u8; 16],
) {
    match encryption_type {
        EncryptionType::None => {
            trace!("No encryption, skipping {} bytes", payload.len());
        }
        EncryptionType::Fast => {
            trace!("Decrypting {} bytes in-place with fast XOR method", payload.len());
            fast_decrypt(payload, key);
        }
        EncryptionType::Salsa20 => {
            trace!("Decrypting {} bytes in-place with Salsa20/8", payload.len());
            salsa_decrypt(payload, key);
        }
    }
}

/// The fast XOR cipher: each byte is rotated left by 4 bits, then XORed
/// with the previous ciphertext byte, its index, and the keystream byte.
/// The initial "previous" byte is 0x36.
pub fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let current = *byte;
        let rotated = current.rotate_left(4);
        *byte = rotated ^ prev ^ (i as u8) ^ key[i % key.len()];
        prev = current;
    }
}

/// Decrypts data in-place with Salsa20 reduced to 8 rounds, as the format
/// requires. Only 128-bit keys are supported; the nonce is always zero.
///
/// State matrix layout (32-bit little-endian words):
/// ```text
/// [c0,   k0,   k1, k2]
/// [k3,   c1,  iv0, iv1]
/// [ctr0, ctr1, c2, k4]
/// [k5,   k6,   k7, c3]
/// ```
/// A 16-byte key fills both key slots, per the standard 128-bit expansion.
pub fn salsa_decrypt(data: &mut [u8], key16: &[u8; 16]) {
    let mut state = [0u32; 16];

    // "expand 16-byte k"
    state[0] = 0x61707865;
    state[5] = 0x3120646e;
    state[10] = 0x79622d36;
    state[15] = 0x6b206574;
    for i in 0..4 {
        state[1 + i] = LittleEndian::read_u32(&key16[i * 4..]);
        state[11 + i] = LittleEndian::read_u32(&key16[i * 4..]);
    }
    state[6] = 0;
    state[7] = 0;

    let mut keystream_block = [0u8; 64];
    for (block_index, chunk) in data.chunks_mut(64).enumerate() {
        state[8] = block_index as u32;
        state[9] = (block_index as u64 >> 32) as u32;

        let mut x = state;
        for _ in 0..4 {
            // one double-round per iteration: columns, then rows
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);
            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }

        for (i, val) in x.iter_mut().enumerate() {
            *val = val.wrapping_add(state[i]);
        }
        for (i, word) in x.iter().enumerate() {
            LittleEndian::write_u32(&mut keystream_block[i * 4..], *word);
        }
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte ^= keystream_block[i];
        }
    }
}

/// A single Salsa20 quarter-round (add-rotate-XOR over four state words).
#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salsa_is_an_involution() {
        let key = [7u8; 16];
        let original: Vec<u8> = (0u8..130).collect();
        let mut data = original.clone();
        salsa_decrypt(&mut data, &key);
        assert_ne!(data, original);
        salsa_decrypt(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn index_key_derivation_is_deterministic() {
        let block = [0u8, 0, 0, 2, 0xde, 0xad, 0xbe, 0xef, 1, 2, 3];
        assert_eq!(derive_key_for_v2_index(&block), derive_key_for_v2_index(&block));
    }

    #[test]
    fn master_key_requires_16_byte_regcode() {
        assert!(derive_master_key(&[1, 2, 3], b"user@example.com").is_err());
        assert!(derive_master_key(&[0u8; 16], b"user@example.com").is_ok());
    }
}
