//! Chunked transfer engine.
//!
//! An [`Uploader`] moves bytes from an [`UploadSource`] to an upload URL. It
//! reads one chunk per [`upload_chunk`](Uploader::upload_chunk) call and
//! streams it into a long-lived transfer request; a request carries at most
//! `request_payload_size` bytes before it is closed and its `Upload-Offset`
//! is checked against the local offset. The next chunk opens a new request.

use bytes::Bytes;
use reqwest::Url;
use tuskit_protocol::{header, parse_offset};
use tuskit_transfer::UploadSource;

use crate::client::TusClient;
use crate::error::{Operation, ProtocolError, UploadError};
use crate::transport::{BodyWriter, HttpResponse};

/// An upload known to the server, ready to transfer from `offset`.
pub struct UploadSession<'a> {
    /// Absolute upload URL.
    pub url: Url,
    /// Bytes the server has already accepted.
    pub offset: u64,
    pub source: &'a mut dyn UploadSource,
}

struct OpenRequest {
    body: Box<dyn BodyWriter>,
    /// Confirmed offset when the request was opened.
    start: u64,
    /// Bytes this request may still carry.
    remaining: u64,
}

enum State {
    Idle,
    Open(OpenRequest),
    Finalized,
}

/// Transfers one upload, chunk by chunk.
///
/// `offset` counts bytes written into transfer requests; it is confirmed
/// against the server each time a request is closed. When a request fails
/// without a confirmation, `offset` and the source go back to where the
/// request started.
pub struct Uploader<'a> {
    client: &'a TusClient,
    url: Url,
    source: &'a mut dyn UploadSource,
    offset: u64,
    buffer: Vec<u8>,
    request_payload_size: u64,
    state: State,
}

impl<'a> Uploader<'a> {
    /// Takes over `session`, positioning its source at the session offset.
    pub async fn new(
        client: &'a TusClient,
        session: UploadSession<'a>,
    ) -> Result<Self, UploadError> {
        let UploadSession {
            url,
            offset,
            source,
        } = session;
        source.seek_to(offset).await?;

        let config = client.config();
        tracing::debug!(%url, offset, size = source.size(), "uploader ready");

        Ok(Self {
            client,
            url,
            source,
            offset,
            buffer: vec![0; config.chunk_size.max(1)],
            request_payload_size: config.request_payload_size.max(1),
            state: State::Idle,
        })
    }

    pub fn upload_url(&self) -> &Url {
        &self.url
    }

    /// Bytes transferred so far, including those of earlier sessions.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    /// Sets how many bytes each [`upload_chunk`](Self::upload_chunk) reads.
    ///
    /// Takes effect with the next chunk; 0 is treated as 1.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.buffer = vec![0; size.max(1)];
    }

    pub fn request_payload_size(&self) -> u64 {
        self.request_payload_size
    }

    /// Sets the byte limit of each transfer request; 0 is treated as 1.
    ///
    /// Fails with [`UploadError::IllegalState`] while a request is open.
    pub fn set_request_payload_size(&mut self, size: u64) -> Result<(), UploadError> {
        if self.is_request_open() {
            return Err(UploadError::IllegalState(
                "request payload size cannot be changed while a request is open",
            ));
        }
        self.request_payload_size = size.max(1);
        Ok(())
    }

    pub fn is_request_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finalized)
    }

    /// Uploads the next chunk.
    ///
    /// Returns the number of bytes sent, or `None` once the source is
    /// exhausted. When the current request reaches its payload limit it is
    /// closed and the server's offset verified before returning.
    pub async fn upload_chunk(&mut self) -> Result<Option<usize>, UploadError> {
        let mut open = match std::mem::replace(&mut self.state, State::Idle) {
            State::Finalized => {
                self.state = State::Finalized;
                return Err(UploadError::IllegalState("upload already finished"));
            }
            State::Open(open) => open,
            State::Idle => {
                if self.source.position() >= self.source.size() {
                    return Ok(None);
                }
                self.open_request().await?
            }
        };

        let want = self
            .buffer
            .len()
            .min(usize::try_from(open.remaining).unwrap_or(usize::MAX));
        let read = match self.source.read(&mut self.buffer[..want]).await {
            Ok(read) => read,
            Err(e) => {
                self.state = State::Open(open);
                return Err(e.into());
            }
        };
        if read == 0 {
            // Source ended before its announced size; finish() closes.
            self.state = State::Open(open);
            return Ok(None);
        }

        let chunk = Bytes::copy_from_slice(&self.buffer[..read]);
        if let Err(e) = open.body.write(chunk).await {
            return Err(self.abandon_request(open, e.into()).await);
        }

        self.offset += read as u64;
        open.remaining -= read as u64;
        tracing::trace!(url = %self.url, offset = self.offset, bytes = read, "chunk sent");

        if open.remaining == 0 {
            self.close_request(open).await?;
        } else {
            self.state = State::Open(open);
        }
        Ok(Some(read))
    }

    /// Closes any open request, verifies its offset and finalizes the
    /// uploader. Further [`upload_chunk`](Self::upload_chunk) calls fail.
    ///
    /// The uploader is finalized even when verification fails.
    pub async fn finish(&mut self) -> Result<(), UploadError> {
        match std::mem::replace(&mut self.state, State::Finalized) {
            State::Finalized => return Ok(()),
            State::Idle => {}
            State::Open(open) => self.close_request(open).await?,
        }

        let size = self.source.size();
        tracing::info!(url = %self.url, offset = self.offset, size, "upload finished");

        if self.offset == size
            && self.client.config().remove_fingerprint_on_success
            && let Some(store) = self.client.store()
        {
            store.remove(self.source.fingerprint())?;
        }
        Ok(())
    }

    /// Uploads every remaining chunk, then finishes. Returns the final
    /// offset.
    pub async fn upload_to_end(&mut self) -> Result<u64, UploadError> {
        while self.upload_chunk().await?.is_some() {}
        self.finish().await?;
        Ok(self.offset)
    }

    async fn open_request(&mut self) -> Result<OpenRequest, UploadError> {
        let request = self.client.transfer_request(&self.url, self.offset);
        let body = self.client.transport().open(request).await?;
        tracing::debug!(url = %self.url, offset = self.offset, "transfer request opened");
        Ok(OpenRequest {
            body,
            start: self.offset,
            remaining: self.request_payload_size,
        })
    }

    async fn close_request(&mut self, open: OpenRequest) -> Result<(), UploadError> {
        let result = match open.body.close().await {
            Ok(response) => self.verify(&response),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                tracing::debug!(url = %self.url, offset = self.offset, "transfer request confirmed");
                Ok(())
            }
            // Reported as is; the server's value is never adopted.
            Err(e @ UploadError::Protocol(ProtocolError::OffsetMismatch { .. })) => Err(e),
            Err(e) => {
                self.rewind(open.start).await;
                Err(e)
            }
        }
    }

    /// Handles a failed body write: the server may already have answered.
    /// Its response explains the failure better than the write error.
    async fn abandon_request(
        &mut self,
        open: OpenRequest,
        write_error: UploadError,
    ) -> UploadError {
        self.rewind(open.start).await;

        match open.body.close().await {
            Ok(response) => self.verify(&response).err().unwrap_or(write_error),
            Err(e) => e.into(),
        }
    }

    /// Drops the unconfirmed bytes of a failed request.
    async fn rewind(&mut self, start: u64) {
        tracing::debug!(
            url = %self.url,
            from = self.offset,
            to = start,
            "rewinding to confirmed offset"
        );
        self.offset = start;
        if let Err(e) = self.source.seek_to(start).await {
            // Source and offset disagree; no further chunk may be sent.
            tracing::warn!(error = %e, offset = start, "failed to rewind source");
            self.state = State::Finalized;
        }
    }

    fn verify(&self, response: &HttpResponse) -> Result<(), UploadError> {
        let status = response.status;
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus {
                operation: Operation::Transfer,
                status,
            }
            .into());
        }

        let actual = response
            .header(header::UPLOAD_OFFSET)
            .and_then(parse_offset)
            .ok_or(ProtocolError::MissingOffset {
                operation: Operation::Transfer,
                status,
            })?;

        if actual != self.offset {
            return Err(ProtocolError::OffsetMismatch {
                expected: self.offset,
                actual,
                status,
            }
            .into());
        }
        Ok(())
    }
}
