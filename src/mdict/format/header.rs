//! Container header parsing and serialization.
//!
//! The header is a single XML element whose attributes carry all metadata:
//!
//! ```text
//! [4 bytes] attribute-text length, big-endian u32
//! [N bytes] UTF-16LE XML element
//! [4 bytes] Adler-32 of the encoded text, little-endian u32
//! ```
//!
//! Two shapes exist: `<Dictionary …/>` for text containers and
//! `<Library_Data …/>` for binary-resource containers. Readers auto-detect
//! the shape from the root element name; writers select it with a flag.

use std::collections::HashMap;
use std::io::{Read, Write};

use adler2::adler32_slice;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::UTF_16LE;
use log::{debug, info};
use quick_xml::escape::escape;
use quick_xml::{events::Event, Reader};

use crate::mdict::codec::crypto;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{
    EncryptionFlags, MdictHeader, MdictMetadata, MdictVersion,
};
use crate::mdict::utils;

/// Root element name of the text-entry shape.
const TEXT_ROOT: &str = "Dictionary";
/// Root element name of the binary-resource shape.
const BINARY_ROOT: &str = "Library_Data";

/// Parses the header from the start of a container.
///
/// `passcode` is an optional `(regcode_hex, user_email)` pair used to derive
/// the master key for encrypted foreign files.
pub fn parse<R: Read>(file: &mut R, passcode: Option<(&str, &str)>) -> Result<MdictHeader> {
    info!("Parsing container header");

    let header_len = file.read_u32::<BigEndian>()?;
    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;

    // The header trailer is the one little-endian checksum in the file.
    let checksum_expected = file.read_u32::<LittleEndian>()?;
    let checksum_actual = adler32_slice(&header_bytes);
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
            context: "header".to_string(),
        });
    }

    let (decoded_header, _, _) = UTF_16LE.decode(&header_bytes);

    // Strip control characters (the trailing NUL in particular) before XML parsing.
    let sanitized_header: String = decoded_header
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let (root_name, attrs) = parse_xml_attributes(&sanitized_header)?;
    let mut header = build_header_from_attributes(&root_name, &attrs)?;
    header.master_key = try_derive_master_key(passcode, &header)?;

    info!(
        "Header parsed: version={}, title='{}', encoding={}, binary={}",
        header.metadata.engine_version,
        header.metadata.title,
        header.encoding.name(),
        header.metadata.is_mdd
    );

    Ok(header)
}

/// Extracts the root element name and its attributes.
fn parse_xml_attributes(xml: &str) -> Result<(String, HashMap<String, String>)> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = e
                    .attributes()
                    .map(|attr_result| {
                        let attr = attr_result.map_err(|e| {
                            MdictError::InvalidFormat(format!("Failed to parse XML attribute: {}", e))
                        })?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| {
                                MdictError::InvalidFormat(format!("Failed to decode XML value: {}", e))
                            })?
                            .into_owned();
                        Ok((key, value))
                    })
                    .collect::<Result<HashMap<_, _>>>()?;
                return Ok((name, attrs));
            }
            Ok(Event::Eof) => {
                return Err(MdictError::InvalidFormat(
                    "No root element found in header XML".to_string(),
                ))
            }
            Err(e) => {
                return Err(MdictError::InvalidFormat(format!(
                    "Failed to read header XML: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Builds the header structure from the parsed attribute map.
fn build_header_from_attributes(
    root_name: &str,
    attrs: &HashMap<String, String>,
) -> Result<MdictHeader> {
    let is_mdd = match root_name {
        TEXT_ROOT => false,
        BINARY_ROOT => true,
        other => {
            return Err(MdictError::InvalidFormat(format!(
                "Unknown header root element: <{}>",
                other
            )))
        }
    };

    let version_str = attrs
        .get("GeneratedByEngineVersion")
        .map(String::as_str)
        .unwrap_or("1.0");
    let version_f32: f32 = version_str.parse().map_err(|e| {
        MdictError::InvalidFormat(format!("Could not parse 'GeneratedByEngineVersion': {}", e))
    })?;
    let version = MdictVersion::try_from(version_f32)?;
    debug!("Engine version: {} (parsed as {:?})", version_str, version);

    let encoding = attrs
        .get("Encoding")
        .map(|s| utils::parse_encoding(s))
        .unwrap_or(encoding_rs::UTF_8);

    let encryption_flags = attrs
        .get("Encrypted")
        .and_then(|s| s.parse::<u8>().ok())
        .map(|flag_val| EncryptionFlags {
            encrypt_record_blocks: (flag_val & 0x01) != 0,
            encrypt_key_index: (flag_val & 0x02) != 0,
        })
        .unwrap_or_default();

    // Binary containers never strip keys; text containers default to stripping.
    let strip_key = attrs
        .get("Stripkey")
        .map(|s| s.eq_ignore_ascii_case("yes"))
        .unwrap_or(!is_mdd);

    let title = attrs
        .get("Title")
        .cloned()
        .unwrap_or_else(|| "Untitled Dictionary".to_string());
    let description = attrs.get("Description").cloned().filter(|s| !s.is_empty());
    let stylesheet_raw = attrs.get("StyleSheet").cloned().filter(|s| !s.is_empty());
    let creation_date = attrs.get("CreationDate").cloned().filter(|s| !s.is_empty());

    Ok(MdictHeader {
        version,
        encoding,
        encryption_flags,
        master_key: None,
        metadata: MdictMetadata {
            title,
            engine_version: version_str.to_string(),
            description,
            stylesheet_raw,
            is_mdd,
            strip_key,
            creation_date,
        },
    })
}

fn try_derive_master_key(
    passcode: Option<(&str, &str)>,
    header: &MdictHeader,
) -> Result<Option<[u8; 16]>> {
    let (reg_code_hex, user_email) = match passcode {
        Some(pair) => pair,
        None => {
            if header.encryption_flags.encrypt_record_blocks {
                return Err(MdictError::PasscodeRequired);
            }
            return Ok(None);
        }
    };

    info!("Deriving master decryption key from provided passcode");
    let reg_code = hex::decode(reg_code_hex)
        .map_err(|e| MdictError::DecryptionError(format!("Invalid regcode hex: {}", e)))?;
    if reg_code.len() != 16 {
        return Err(MdictError::DecryptionError(
            "Registration code must be exactly 16 bytes (32 hex chars)".to_string(),
        ));
    }
    let master_key = crypto::derive_master_key(&reg_code, user_email.as_bytes())?;
    Ok(Some(master_key))
}

/// Everything the writer needs to serialize a header.
#[derive(Debug, Clone)]
pub struct HeaderSpec<'a> {
    pub version: MdictVersion,
    /// Encoding label written into the `Encoding` attribute (text shape only).
    pub encoding_label: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub stylesheet: &'a str,
    pub is_mdd: bool,
    /// `YYYY-M-D`; today when `None`.
    pub creation_date: Option<&'a str>,
}

/// Serializes a header: length prefix, UTF-16LE attribute text, LE checksum.
pub fn write<W: Write>(out: &mut W, spec: &HeaderSpec) -> Result<()> {
    let date_owned;
    let date = match spec.creation_date {
        Some(d) => d,
        None => {
            let today = chrono::Local::now().date_naive();
            use chrono::Datelike;
            date_owned = format!("{}-{}-{}", today.year(), today.month(), today.day());
            &date_owned
        }
    };

    let engine_version = spec.version.engine_version();
    let title = escape(spec.title);
    let description = escape(spec.description);
    let stylesheet = escape(spec.stylesheet);

    let text = if !spec.is_mdd {
        format!(
            concat!(
                "<Dictionary ",
                "GeneratedByEngineVersion=\"{version}\" ",
                "RequiredEngineVersion=\"{version}\" ",
                "Encrypted=\"No\" ",
                "Encoding=\"{encoding}\" ",
                "Format=\"Html\" ",
                "Stripkey=\"Yes\" ",
                "CreationDate=\"{date}\" ",
                "Compact=\"Yes\" ",
                "Compat=\"Yes\" ",
                "KeyCaseSensitive=\"No\" ",
                "Description=\"{description}\" ",
                "Title=\"{title}\" ",
                "DataSourceFormat=\"106\" ",
                "StyleSheet=\"{stylesheet}\" ",
                "Left2Right=\"Yes\" ",
                "RegisterBy=\"\" ",
                "/>\r\n\x00"
            ),
            version = engine_version,
            encoding = spec.encoding_label,
            date = date,
            description = description,
            title = title,
            stylesheet = stylesheet,
        )
    } else {
        format!(
            concat!(
                "<Library_Data ",
                "GeneratedByEngineVersion=\"{version}\" ",
                "RequiredEngineVersion=\"{version}\" ",
                "Encrypted=\"No\" ",
                "Encoding=\"\" ",
                "Format=\"\" ",
                "CreationDate=\"{date}\" ",
                "KeyCaseSensitive=\"No\" ",
                "Stripkey=\"No\" ",
                "Description=\"{description}\" ",
                "Title=\"{title}\" ",
                "RegisterBy=\"\" ",
                "/>\r\n\x00"
            ),
            version = engine_version,
            date = date,
            description = description,
            title = title,
        )
    };

    let encoded = utils::encode_text(&text, UTF_16LE)?;
    out.write_u32::<BigEndian>(encoded.len() as u32)?;
    out.write_all(&encoded)?;
    out.write_u32::<LittleEndian>(adler32_slice(&encoded))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>() -> HeaderSpec<'a> {
        HeaderSpec {
            version: MdictVersion::V2,
            encoding_label: "UTF-8",
            title: "Test & Sample",
            description: "A <test> dictionary",
            stylesheet: "",
            is_mdd: false,
            creation_date: Some("2024-1-1"),
        }
    }

    #[test]
    fn header_round_trip_text_shape() {
        let mut buf = Vec::new();
        write(&mut buf, &spec()).unwrap();
        let header = parse(&mut buf.as_slice(), None).unwrap();
        assert_eq!(header.version, MdictVersion::V2);
        assert!(!header.metadata.is_mdd);
        assert!(header.metadata.strip_key);
        assert_eq!(header.metadata.title, "Test & Sample");
        assert_eq!(header.metadata.description.as_deref(), Some("A <test> dictionary"));
        assert_eq!(header.encoding, encoding_rs::UTF_8);
        assert_eq!(header.metadata.creation_date.as_deref(), Some("2024-1-1"));
    }

    #[test]
    fn header_round_trip_binary_shape() {
        let mut buf = Vec::new();
        let mut s = spec();
        s.is_mdd = true;
        s.version = MdictVersion::V1;
        write(&mut buf, &s).unwrap();
        let header = parse(&mut buf.as_slice(), None).unwrap();
        assert_eq!(header.version, MdictVersion::V1);
        assert!(header.metadata.is_mdd);
        assert!(!header.metadata.strip_key);
    }

    #[test]
    fn corrupted_header_fails_checksum() {
        let mut buf = Vec::new();
        write(&mut buf, &spec()).unwrap();
        buf[20] ^= 0xFF;
        match parse(&mut buf.as_slice(), None) {
            Err(MdictError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other.map(|_| ())),
        }
    }
}
