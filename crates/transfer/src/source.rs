use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tuskit_protocol::Metadata;

use crate::TransferError;
use crate::fingerprint::{Fingerprint, checksum_bytes};

/// Boxed future returned by [`UploadSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// A sized, seekable byte stream that can be uploaded.
///
/// `size`, `fingerprint` and `metadata` are fixed once the source exists.
/// `position` starts at 0, moves forward with every read and never exceeds
/// `size`.
pub trait UploadSource: Send {
    /// Total number of bytes in the source.
    fn size(&self) -> u64;

    /// Key under which this upload's location is remembered for resumption.
    fn fingerprint(&self) -> &str;

    /// Metadata sent when the upload is created.
    fn metadata(&self) -> &Metadata;

    /// Byte offset of the next read.
    fn position(&self) -> u64;

    /// Moves the read position to `offset`.
    fn seek_to(&mut self, offset: u64) -> SourceFuture<'_, ()>;

    /// Reads up to `buf.len()` bytes.
    ///
    /// Fills the whole buffer unless the end of the source is reached first;
    /// returns 0 once the source is exhausted.
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> SourceFuture<'a, usize>;
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Uploads a file from disk.
pub struct FileSource {
    file: tokio::fs::File,
    path: PathBuf,
    size: u64,
    position: u64,
    fingerprint: String,
    metadata: Metadata,
}

impl FileSource {
    /// Opens `path` with the [`Fingerprint::PathAndSize`] fingerprint.
    ///
    /// The metadata starts with a single `filename` entry holding the file
    /// name.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        Self::open_with(path, Fingerprint::default()).await
    }

    /// Opens `path` and fingerprints it with `strategy`.
    pub async fn open_with(
        path: impl AsRef<Path>,
        strategy: Fingerprint,
    ) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let fingerprint = strategy.compute(path, size).await?;

        let mut metadata = Metadata::new();
        if let Some(name) = path.file_name() {
            metadata.insert("filename", name.to_string_lossy());
        }

        tracing::debug!(path = %path.display(), size, %fingerprint, "opened file source");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            position: 0,
            fingerprint,
            metadata,
        })
    }

    /// Replaces the computed fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Replaces the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek_to(&mut self, offset: u64) -> SourceFuture<'_, ()> {
        Box::pin(async move {
            if offset > self.size {
                return Err(TransferError::SeekOutOfRange {
                    offset,
                    size: self.size,
                });
            }
            self.file.seek(SeekFrom::Start(offset)).await?;
            self.position = offset;
            Ok(())
        })
    }

    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> SourceFuture<'a, usize> {
        Box::pin(async move {
            // The file may have grown since it was opened; never read past
            // the size announced to the server.
            let remaining = self.size - self.position;
            let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

            let mut filled = 0;
            while filled < want {
                let n = self.file.read(&mut buf[filled..want]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            self.position += filled as u64;
            Ok(filled)
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Uploads bytes held in memory.
pub struct MemorySource {
    data: Vec<u8>,
    position: u64,
    fingerprint: String,
    metadata: Metadata,
}

impl MemorySource {
    /// Wraps `data`; the fingerprint is the SHA-256 of its content.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let fingerprint = format!("sha256:{}", checksum_bytes(&data));
        Self {
            data,
            position: 0,
            fingerprint,
            metadata: Metadata::new(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl UploadSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek_to(&mut self, offset: u64) -> SourceFuture<'_, ()> {
        Box::pin(async move {
            if offset > self.size() {
                return Err(TransferError::SeekOutOfRange {
                    offset,
                    size: self.size(),
                });
            }
            self.position = offset;
            Ok(())
        })
    }

    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> SourceFuture<'a, usize> {
        Box::pin(async move {
            let start = self.position as usize;
            let n = buf.len().min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.position += n as u64;
            Ok(n)
        })
    }
}
