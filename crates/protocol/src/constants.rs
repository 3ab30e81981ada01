/// Protocol version sent in the `Tus-Resumable` header of every request.
pub const TUS_VERSION: &str = "1.0.0";

/// Content type of transfer request bodies.
pub const CONTENT_TYPE_OFFSET_STREAM: &str = "application/offset+octet-stream";

/// Default chunk buffer size: 2 MiB.
///
/// One chunk is read from the source into memory before it is written to
/// the open request, so this is also the per-upload memory footprint.
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Default maximum payload of a single transfer request: 1 GiB.
///
/// Uploads larger than this are split over several requests.
pub const DEFAULT_REQUEST_PAYLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// Header names used by the protocol.
pub mod header {
    pub const TUS_RESUMABLE: &str = "tus-resumable";
    pub const UPLOAD_OFFSET: &str = "upload-offset";
    pub const UPLOAD_LENGTH: &str = "upload-length";
    pub const UPLOAD_METADATA: &str = "upload-metadata";
    pub const METHOD_OVERRIDE: &str = "x-http-method-override";
}
