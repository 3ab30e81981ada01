//! Wire-level building blocks of the tus resumable upload protocol.
//!
//! Nothing in this crate performs I/O: it names the headers, fixes the
//! protocol constants and converts upload metadata to and from its header
//! representation.

pub mod constants;
pub mod metadata;

// Re-export primary types for convenience.
pub use constants::{
    CONTENT_TYPE_OFFSET_STREAM, DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_PAYLOAD_SIZE, TUS_VERSION,
    header,
};
pub use metadata::{Metadata, MetadataError};

/// Parses an `Upload-Offset` (or `Upload-Length`) header value.
///
/// Returns `None` for anything that is not a plain non-negative decimal
/// integer, including empty strings, signs and surrounding garbage.
pub fn parse_offset(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
