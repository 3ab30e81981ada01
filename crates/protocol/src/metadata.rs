//! `Upload-Metadata` codec.
//!
//! Each entry is encoded as the key, a single space and the standard base64
//! (padded) encoding of the UTF-8 value. Entries are joined with `,` in
//! insertion order. Keys are written verbatim: a key containing `,`, a space
//! or non-ASCII bytes produces a header the server cannot split correctly.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Errors produced while decoding an `Upload-Metadata` header.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata value for {key} is not valid base64")]
    InvalidBase64 { key: String },

    #[error("metadata value for {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },
}

/// Ordered string key/value pairs attached to an upload at creation.
///
/// Iteration order is insertion order; inserting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Creates an empty metadata map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the map into its header value.
    ///
    /// An empty map encodes to an empty string; callers must then omit the
    /// header entirely instead of sending it blank.
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                encoded.push(',');
            }
            encoded.push_str(key);
            encoded.push(' ');
            encoded.push_str(&STANDARD.encode(value.as_bytes()));
        }
        encoded
    }

    /// Decodes a header value produced by [`encode`](Self::encode).
    ///
    /// Entries without a value (a bare key) decode to an empty string, which
    /// is how servers represent keys sent without data.
    pub fn decode(header: &str) -> Result<Self, MetadataError> {
        let mut metadata = Self::new();
        for entry in header.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, encoded) = match entry.split_once(' ') {
                Some((key, encoded)) => (key, encoded.trim()),
                None => (entry, ""),
            };
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|_| MetadataError::InvalidBase64 { key: key.into() })?;
            let value =
                String::from_utf8(bytes).map_err(|_| MetadataError::InvalidUtf8 { key: key.into() })?;
            metadata.insert(key, value);
        }
        Ok(metadata)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}
