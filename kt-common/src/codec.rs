//! # Tab-Separated Record Codec
//!
//! Purpose: Convert record lists to and from the `text/tab-separated-values`
//! bodies exchanged with the server's RPC endpoints.
//!
//! ## Design Principles
//! 1. **Whole-Message Encoding**: One encoding applies to every field of a
//!    message; a single non-printable byte anywhere switches all of it to
//!    base64.
//! 2. **Cheap Sniffing**: The decoder looks only at the last character of the
//!    content-type (`s`, `U` or `B`) instead of parsing the media type.
//! 3. **Fail Fast**: Unknown content-types and malformed lines are errors,
//!    never empty results.
//!
//! ## Wire Format
//!
//! ```text
//! key<TAB>value<LF>key<TAB>value<LF>...
//!
//! Content-Type: text/tab-separated-values            -> identity
//! Content-Type: text/tab-separated-values; colenc=U  -> URL-encoded fields
//! Content-Type: text/tab-separated-values; colenc=B  -> base64 fields
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{percent_decode, percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{CodecError, CodecResult};
use crate::record::KvRecord;

/// Content-type of identity-encoded bodies.
pub const IDENTITY_CONTENT_TYPE: &str = "text/tab-separated-values";

/// Content-type of URL-encoded bodies.
pub const URL_CONTENT_TYPE: &str = "text/tab-separated-values; colenc=U";

/// Content-type of base64-encoded bodies.
pub const BASE64_CONTENT_TYPE: &str = "text/tab-separated-values; colenc=B";

/// Bytes escaped by the URL field encoding: everything but RFC 3986 unreserved.
const URL_FIELD: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Field encoding of a whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Fields are written verbatim (printable ASCII only).
    Identity,
    /// Fields are percent-encoded.
    Url,
    /// Fields are standard-alphabet, padded base64.
    Base64,
}

impl Encoding {
    /// Content-type header advertising this encoding.
    pub const fn content_type(self) -> &'static str {
        match self {
            Encoding::Identity => IDENTITY_CONTENT_TYPE,
            Encoding::Url => URL_CONTENT_TYPE,
            Encoding::Base64 => BASE64_CONTENT_TYPE,
        }
    }

    /// Selects the encoding from the last character of a content-type.
    pub fn from_content_type(content_type: &str) -> CodecResult<Self> {
        match content_type.trim_end().chars().last() {
            Some('s') => Ok(Encoding::Identity),
            Some('U') => Ok(Encoding::Url),
            Some('B') => Ok(Encoding::Base64),
            _ => Err(CodecError::UnknownContentType(content_type.to_string())),
        }
    }

    /// Appends one encoded field to `out`.
    pub fn encode_field(self, field: &[u8], out: &mut Vec<u8>) {
        match self {
            Encoding::Identity => out.extend_from_slice(field),
            Encoding::Url => {
                for chunk in percent_encode(field, URL_FIELD) {
                    out.extend_from_slice(chunk.as_bytes());
                }
            }
            Encoding::Base64 => out.extend_from_slice(STANDARD.encode(field).as_bytes()),
        }
    }

    /// Decodes one field; `line` is only used for error reporting.
    pub fn decode_field(self, field: &[u8], line: usize) -> CodecResult<Vec<u8>> {
        match self {
            Encoding::Identity => Ok(field.to_vec()),
            Encoding::Url => Ok(percent_decode(field).collect()),
            Encoding::Base64 => STANDARD
                .decode(field)
                .map_err(|source| CodecError::InvalidBase64 { line, source }),
        }
    }
}

/// Returns true when `data` holds a byte outside printable ASCII.
#[inline]
pub fn has_binary(data: &[u8]) -> bool {
    data.iter().any(|&b| !(0x20..=0x7e).contains(&b))
}

/// Encodes records, choosing identity or base64 for the whole message.
///
/// An empty list yields an empty body with the identity content-type.
pub fn encode(records: &[KvRecord]) -> (Vec<u8>, &'static str) {
    let binary = records
        .iter()
        .any(|record| has_binary(&record.key) || has_binary(&record.value));
    let encoding = if binary {
        Encoding::Base64
    } else {
        Encoding::Identity
    };
    (encode_with(records, encoding), encoding.content_type())
}

/// Encodes records with an explicit encoding.
///
/// Identity output is only well-formed when no field contains a tab or a
/// newline; [`encode`] guarantees that by switching to base64.
pub fn encode_with(records: &[KvRecord], encoding: Encoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        records
            .iter()
            .map(|record| record.key.len() + record.value.len() + 2)
            .sum(),
    );
    for record in records {
        encoding.encode_field(&record.key, &mut out);
        out.push(b'\t');
        encoding.encode_field(&record.value, &mut out);
        out.push(b'\n');
    }
    out
}

/// Decodes a response body using the encoding named by `content_type`.
///
/// Empty lines are skipped and a trailing `\r` is dropped. Each remaining
/// line splits on its first tab; a line without one is an error.
pub fn decode(body: &[u8], content_type: &str) -> CodecResult<Vec<KvRecord>> {
    let encoding = Encoding::from_content_type(content_type)?;

    let mut records = Vec::new();
    for (idx, raw) in body.split(|&b| b == b'\n').enumerate() {
        let line = idx + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            continue;
        }

        let tab = raw
            .iter()
            .position(|&b| b == b'\t')
            .ok_or(CodecError::MissingSeparator { line })?;
        records.push(KvRecord {
            key: encoding.decode_field(&raw[..tab], line)?,
            value: encoding.decode_field(&raw[tab + 1..], line)?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_encodes_to_empty_identity_body() {
        let (body, content_type) = encode(&[]);
        assert!(body.is_empty());
        assert_eq!(content_type, IDENTITY_CONTENT_TYPE);
    }

    #[test]
    fn printable_records_stay_verbatim() {
        let records = vec![KvRecord::new("key", "k"), KvRecord::new("value", "v w")];
        let (body, content_type) = encode(&records);
        assert_eq!(body, b"key\tk\nvalue\tv w\n");
        assert_eq!(content_type, IDENTITY_CONTENT_TYPE);
    }

    #[test]
    fn one_binary_byte_switches_whole_message_to_base64() {
        let records = vec![KvRecord::new("key", "plain"), KvRecord::new("value", [0u8, 1, 2])];
        let (body, content_type) = encode(&records);
        assert_eq!(content_type, BASE64_CONTENT_TYPE);
        assert_eq!(body, b"a2V5\tcGxhaW4=\ndmFsdWU=\tAAEC\n");
    }

    #[test]
    fn tab_and_newline_count_as_binary() {
        assert!(has_binary(b"a\tb"));
        assert!(has_binary(b"a\nb"));
        assert!(has_binary(&[0x7f]));
        assert!(!has_binary(b" ~"));
    }

    #[test]
    fn sniffs_last_character_only() {
        assert_eq!(Encoding::from_content_type(IDENTITY_CONTENT_TYPE).unwrap(), Encoding::Identity);
        assert_eq!(Encoding::from_content_type(URL_CONTENT_TYPE).unwrap(), Encoding::Url);
        assert_eq!(Encoding::from_content_type(BASE64_CONTENT_TYPE).unwrap(), Encoding::Base64);
        assert!(matches!(
            Encoding::from_content_type("application/json"),
            Err(CodecError::UnknownContentType(_))
        ));
        assert!(Encoding::from_content_type("").is_err());
    }

    #[test]
    fn decodes_url_encoded_fields() {
        let records = decode(b"caf%C3%A9\ta%09b\n", URL_CONTENT_TYPE).unwrap();
        assert_eq!(records, vec![KvRecord::new("café", "a\tb")]);
    }

    #[test]
    fn url_encoding_escapes_separators() {
        let body = encode_with(&[KvRecord::new("a b", "x\ty/z")], Encoding::Url);
        assert_eq!(body, b"a%20b\tx%09y%2Fz\n");
    }

    #[test]
    fn skips_empty_lines_and_accepts_missing_final_newline() {
        let records = decode(b"\nnum\t3\n\r\ncount\t7", IDENTITY_CONTENT_TYPE).unwrap();
        assert_eq!(records, vec![KvRecord::new("num", "3"), KvRecord::new("count", "7")]);
    }

    #[test]
    fn splits_on_first_tab_only() {
        let records = decode(b"k\tv1\tv2\n", IDENTITY_CONTENT_TYPE).unwrap();
        assert_eq!(records, vec![KvRecord::new("k", "v1\tv2")]);
    }

    #[test]
    fn line_without_tab_is_an_error() {
        let err = decode(b"ok\t1\nbroken\n", IDENTITY_CONTENT_TYPE).unwrap_err();
        assert!(matches!(err, CodecError::MissingSeparator { line: 2 }));
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let err = decode(b"!!!\tAAEC\n", BASE64_CONTENT_TYPE).unwrap_err();
        assert!(matches!(err, CodecError::InvalidBase64 { line: 1, .. }));
    }
}
