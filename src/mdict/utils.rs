//! Low-level byte and text codec utilities shared by the reader and writer.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16LE};

use super::types::error::{MdictError, Result};

/// Read a 4 or 8 byte big-endian number.
///
/// Used throughout the format for size and count fields.
/// Width depends on the version regime (v1.x uses 4 bytes, v2.x uses 8 bytes).
pub fn read_number(reader: &mut impl Read, number_width: usize) -> Result<u64> {
    match number_width {
        8 => Ok(reader.read_u64::<BigEndian>()?),
        4 => Ok(reader.read_u32::<BigEndian>()? as u64),
        _ => Err(MdictError::InvalidFormat(format!("Invalid number width: {}", number_width))),
    }
}

/// Read a 1 or 2 byte big-endian number.
///
/// Used for text length prefixes in the key index.
pub fn read_small_number(reader: &mut impl Read, number_width: usize) -> Result<u64> {
    match number_width {
        2 => Ok(reader.read_u16::<BigEndian>()? as u64),
        1 => Ok(reader.read_u8()? as u64),
        _ => Err(MdictError::InvalidFormat(format!("Invalid small number width: {}", number_width))),
    }
}

/// Write a 4 or 8 byte big-endian number, the mirror of [`read_number`].
pub fn write_number(writer: &mut impl Write, value: u64, number_width: usize) -> Result<()> {
    match number_width {
        8 => writer.write_u64::<BigEndian>(value)?,
        4 => {
            if value > u32::MAX as u64 {
                return Err(MdictError::SizeMismatch {
                    context: "32-bit field".to_string(),
                    expected: u32::MAX as u64,
                    found: value,
                });
            }
            writer.write_u32::<BigEndian>(value as u32)?;
        }
        _ => return Err(MdictError::InvalidFormat(format!("Invalid number width: {}", number_width))),
    }
    Ok(())
}

/// Write a 1 or 2 byte big-endian number, the mirror of [`read_small_number`].
///
/// These are key-length prefixes; a key too long for the regime's prefix
/// width is a hard error, not a truncation.
pub fn write_small_number(writer: &mut impl Write, value: u64, number_width: usize) -> Result<()> {
    let max = match number_width {
        2 => u16::MAX as u64,
        1 => u8::MAX as u64,
        _ => return Err(MdictError::InvalidFormat(format!("Invalid small number width: {}", number_width))),
    };
    if value > max {
        return Err(MdictError::SizeMismatch {
            context: "key length prefix".to_string(),
            expected: max,
            found: value,
        });
    }
    match number_width {
        2 => writer.write_u16::<BigEndian>(value as u16)?,
        1 => writer.write_u8(value as u8)?,
        _ => unreachable!(),
    }
    Ok(())
}

/// Width in bytes of one text code unit under the given encoding.
///
/// UTF-16 text is counted in 2-byte units; every other supported encoding
/// counts single bytes.
pub fn unit_width(encoding: &'static Encoding) -> usize {
    if encoding == UTF_16LE { 2 } else { 1 }
}

/// Resolve an encoding label from a header attribute or CLI flag.
///
/// Normalizes the labels MDict files use in the wild: GBK and GB2312 are
/// folded into GB18030, "UTF-16" means little-endian. Unknown or empty
/// labels fall back to UTF-8.
pub fn parse_encoding(label: &str) -> &'static Encoding {
    let normalized = match label {
        "GBK" | "GB2312" => "GB18030",
        "UTF-16" | "utf16" | "utf-16" => "UTF-16LE",
        other => other,
    };
    Encoding::for_label(normalized.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Encode text into the container encoding.
///
/// encoding_rs deliberately has no UTF-16 encoder, so that path is done by
/// hand; all other encodings go through the regular encoder and report
/// unmappable characters as an error instead of silently substituting.
pub fn encode_text(text: &str, encoding: &'static Encoding) -> Result<Vec<u8>> {
    if encoding == UTF_16LE {
        let mut out = Vec::with_capacity(text.len() * 2);
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        return Ok(out);
    }
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(MdictError::EncodingError {
            encoding: encoding.name(),
            context: format!("text {:?} has no representation in this encoding", text),
        });
    }
    Ok(bytes.into_owned())
}

/// The encoded NUL terminator for the given encoding (one code unit).
pub fn nul_bytes(encoding: &'static Encoding) -> &'static [u8] {
    if unit_width(encoding) == 2 { &[0, 0] } else { &[0] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_round_trip_both_widths() {
        for &(value, width) in &[(0u64, 4usize), (1, 4), (0xFFFF_FFFF, 4), (0, 8), (1 << 40, 8)] {
            let mut buf = Vec::new();
            write_number(&mut buf, value, width).unwrap();
            assert_eq!(buf.len(), width);
            let mut reader = buf.as_slice();
            assert_eq!(read_number(&mut reader, width).unwrap(), value);
        }
    }

    #[test]
    fn narrow_field_overflow_is_rejected() {
        let mut buf = Vec::new();
        assert!(write_number(&mut buf, u32::MAX as u64 + 1, 4).is_err());
    }

    #[test]
    fn utf16_text_is_encoded_little_endian() {
        let bytes = encode_text("ab", UTF_16LE).unwrap();
        assert_eq!(bytes, vec![b'a', 0, b'b', 0]);
    }

    #[test]
    fn encoding_labels_are_normalized() {
        assert_eq!(parse_encoding("GBK"), encoding_rs::GB18030);
        assert_eq!(parse_encoding("UTF-16"), UTF_16LE);
        assert_eq!(parse_encoding(""), encoding_rs::UTF_8);
    }
}
