//! Upload error types.

use std::fmt;

use reqwest::StatusCode;

use crate::transport::TransportError;

/// Request whose response broke the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Resume,
    Transfer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "creating upload",
            Operation::Resume => "resuming upload",
            Operation::Transfer => "uploading chunk",
        })
    }
}

/// The server answered, but not the way the protocol requires.
///
/// Every variant carries the status of the causing response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected status code ({status}) while {operation}")]
    UnexpectedStatus {
        operation: Operation,
        status: StatusCode,
    },

    #[error("missing upload URL in response for creating upload (status {status})")]
    MissingLocation { status: StatusCode },

    #[error("response to {operation} contains no or invalid Upload-Offset header (status {status})")]
    MissingOffset {
        operation: Operation,
        status: StatusCode,
    },

    #[error("response contains different Upload-Offset value ({actual}) than expected ({expected})")]
    OffsetMismatch {
        expected: u64,
        actual: u64,
        status: StatusCode,
    },
}

impl ProtocolError {
    /// Status code of the response that caused the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::UnexpectedStatus { status, .. }
            | ProtocolError::MissingLocation { status }
            | ProtocolError::MissingOffset { status, .. }
            | ProtocolError::OffsetMismatch { status, .. } => *status,
        }
    }
}

/// Errors produced by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("resuming is not enabled: the client has no url store")]
    ResumingDisabled,

    #[error("fingerprint not found in url store: {fingerprint}")]
    FingerprintNotFound { fingerprint: String },

    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("source error: {0}")]
    Source(#[from] tuskit_transfer::TransferError),

    #[error("store error: {0}")]
    Store(#[from] tuskit_store::StoreError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl UploadError {
    /// Status of the causing response, for protocol errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UploadError::Protocol(e) => Some(e.status()),
            _ => None,
        }
    }
}
