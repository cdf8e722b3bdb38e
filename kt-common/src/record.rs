//! # Key/Value Records
//!
//! Purpose: Model the unit of data exchanged with the server: one key and one
//! value, both opaque byte strings.
//!
//! ## Design Principles
//! 1. **Binary-Safe**: Keys and values are raw bytes; text is only a view.
//! 2. **Owned Per Call**: A record list belongs to the request or response
//!    that built it and is never shared.
//! 3. **Flat Messages**: User keys and protocol metadata share one list; the
//!    bulk prefix below tells them apart.

use std::borrow::Cow;
use std::fmt;

/// Sentinel prepended to user keys in bulk requests and responses.
pub const BULK_KEY_PREFIX: u8 = b'_';

/// Record key carrying a server-side error message.
pub const ERROR_FIELD: &[u8] = b"ERROR";

/// One key/value pair of a wire message.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct KvRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvRecord {
    /// Builds a record from anything byte-like.
    pub fn new(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        KvRecord {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }
    }

    /// Builds a bulk item record: the key gains the `_` prefix.
    pub fn bulk(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        let key = key.as_ref();
        let mut prefixed = Vec::with_capacity(key.len() + 1);
        prefixed.push(BULK_KEY_PREFIX);
        prefixed.extend_from_slice(key);
        KvRecord {
            key: prefixed,
            value: value.as_ref().to_vec(),
        }
    }

    /// Returns the user key when this record is a bulk item.
    ///
    /// Records without the `_` prefix are protocol metadata (`num`, `max`...)
    /// and yield `None`.
    #[inline]
    pub fn bulk_key(&self) -> Option<&[u8]> {
        match self.key.split_first() {
            Some((&BULK_KEY_PREFIX, rest)) => Some(rest),
            _ => None,
        }
    }

    /// Key decoded as UTF-8, replacing invalid sequences.
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    /// Value decoded as UTF-8, replacing invalid sequences.
    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

impl fmt::Debug for KvRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvRecord")
            .field("key", &self.key_str())
            .field("value", &self.value_str())
            .finish()
    }
}

/// Finds the first record whose key equals `key`.
pub fn find_record<'a>(records: &'a [KvRecord], key: &[u8]) -> Option<&'a KvRecord> {
    records.iter().find(|record| record.key == key)
}
