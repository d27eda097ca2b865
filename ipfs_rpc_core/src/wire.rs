//! Multibase wrapping of binary fields in the daemon's RPC wire format.
//!
//! JSON cannot carry raw bytes and topic names may contain arbitrary bytes,
//! so the daemon exchanges such values as multibase `base64url` strings
//! (prefix `u`, no padding). Both directions go through this module.

use multibase::Base;

use crate::error::{Error, Result};

/// Multibase encoding used by the daemon for binary fields.
pub const WIRE_BASE: Base = Base::Base64Url;

/// Decodes a multibase `base64url` field into raw bytes.
///
/// An empty payload (`"u"`) decodes to an empty vector.
pub fn decode_bytes(field: &str) -> Result<Vec<u8>> {
    let (base, bytes) = multibase::decode(field)?;
    if base != WIRE_BASE {
        return Err(Error::protocol(format!(
            "expected base64url multibase field, got {base:?}"
        )));
    }
    Ok(bytes)
}

/// Decodes a multibase field and interprets the bytes as UTF-8.
pub fn decode_text(field: &str) -> Result<String> {
    let bytes = decode_bytes(field)?;
    String::from_utf8(bytes)
        .map_err(|err| Error::protocol(format!("wire field is not valid UTF-8: {err}")))
}

pub fn decode_text_array<S: AsRef<str>>(fields: &[S]) -> Result<Vec<String>> {
    fields.iter().map(|f| decode_text(f.as_ref())).collect()
}

/// Decodes a multibase field as a big-endian unsigned integer.
///
/// Leading zero bytes are ignored; anything that does not fit in 64 bits
/// is rejected, as is an empty payload.
pub fn decode_big_uint(field: &str) -> Result<u64> {
    let bytes = decode_bytes(field)?;
    if bytes.is_empty() {
        return Err(Error::protocol("empty integer field"));
    }
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return Ok(0),
    };
    if significant.len() > 8 {
        return Err(Error::protocol(format!(
            "integer field too wide: {} bytes",
            significant.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf[8 - significant.len()..].copy_from_slice(significant);
    Ok(u64::from_be_bytes(buf))
}

/// Encodes text the way the daemon expects topic names on the query string.
pub fn encode_text(text: &str) -> String {
    encode_bytes(text.as_bytes())
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    multibase::encode(WIRE_BASE, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_roundtrip() {
        for topic in ["", "t", "news/sport", "日本語のトピック", "emoji 🚀 topic", "a\u{0}b"] {
            let wire = encode_text(topic);
            assert!(wire.starts_with('u'));
            assert_eq!(decode_text(&wire).unwrap(), topic);
        }
    }

    #[test]
    fn encoding_is_url_safe() {
        let wire = encode_bytes(&[0xfb, 0xff, 0xfe]);
        assert!(!wire.contains('+'));
        assert!(!wire.contains('/'));
        assert!(!wire.contains('='));
    }

    #[test]
    fn empty_field_decodes_to_empty_bytes() {
        assert!(decode_bytes("u").unwrap().is_empty());
    }

    #[test]
    fn rejects_other_bases() {
        let b32 = multibase::encode(Base::Base32Lower, b"hello");
        assert!(matches!(decode_bytes(&b32), Err(Error::Protocol(_))));
    }

    #[test]
    fn rejects_invalid_utf8_text() {
        let wire = encode_bytes(&[0xff, 0xfe]);
        assert!(matches!(decode_text(&wire), Err(Error::Protocol(_))));
    }

    #[test]
    fn big_uint_is_big_endian() {
        assert_eq!(decode_big_uint(&encode_bytes(&[0x01, 0x00])).unwrap(), 256);
        assert_eq!(
            decode_big_uint(&encode_bytes(&[0x16, 0x2b, 0x5f, 0x9c, 0x00, 0x00, 0x00, 0x01])).unwrap(),
            0x162b_5f9c_0000_0001
        );
        // Leading zeroes do not count towards the width.
        let mut wide = vec![0u8; 4];
        wide.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(decode_big_uint(&encode_bytes(&wide)).unwrap(), u64::MAX);
    }

    #[test]
    fn big_uint_rejects_overflow_and_empty() {
        assert!(decode_big_uint(&encode_bytes(&[1u8; 9])).is_err());
        assert!(decode_big_uint("u").is_err());
    }

    #[test]
    fn text_array_decodes_each_entry() {
        let fields = vec![encode_text("a"), encode_text("b")];
        assert_eq!(decode_text_array(&fields).unwrap(), vec!["a", "b"]);
    }
}
