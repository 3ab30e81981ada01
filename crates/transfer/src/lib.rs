//! Upload sources: sized, seekable, fingerprinted byte streams.
//!
//! The upload engine only talks to the [`UploadSource`] trait. Two
//! implementations ship with the crate: [`FileSource`] for files on disk and
//! [`MemorySource`] for payloads already held in memory.

mod fingerprint;
mod source;

pub use fingerprint::{Fingerprint, calculate_file_checksum, checksum_bytes};
pub use source::{FileSource, MemorySource, SourceFuture, UploadSource};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot seek to offset {offset}: source is only {size} bytes")]
    SeekOutOfRange { offset: u64, size: u64 },
}
