//! Session coordinator: creates uploads and finds where interrupted ones
//! left off.

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, EXPECT, HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Method, StatusCode, Url};
use tuskit_protocol::{CONTENT_TYPE_OFFSET_STREAM, TUS_VERSION, header, parse_offset};
use tuskit_store::UrlStore;
use tuskit_transfer::UploadSource;

use crate::config::ClientConfig;
use crate::error::{Operation, ProtocolError, UploadError};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};
use crate::uploader::{UploadSession, Uploader};

/// Entry point for uploads to one tus endpoint.
///
/// Resuming is decided at construction: only a client built with
/// [`with_resuming`](Self::with_resuming) remembers upload locations and can
/// [`resume_upload`](Self::resume_upload).
pub struct TusClient {
    config: ClientConfig,
    endpoint: Url,
    /// `Tus-Resumable` plus the configured custom headers.
    headers: HeaderMap,
    transport: Arc<dyn HttpTransport>,
    store: Option<Arc<dyn UrlStore>>,
}

impl TusClient {
    /// Creates a client using the `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, UploadError> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client sending requests through `transport`.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, UploadError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| UploadError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(header::TUS_RESUMABLE),
            HeaderValue::from_static(TUS_VERSION),
        );
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| UploadError::InvalidHeader(format!("invalid name {name:?}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| UploadError::InvalidHeader(format!("invalid value for {name}")))?;
            headers.append(header_name, header_value);
        }

        Ok(Self {
            config,
            endpoint,
            headers,
            transport,
            store: None,
        })
    }

    /// Enables resuming: upload locations are saved to and looked up in
    /// `store`, keyed by source fingerprint.
    pub fn with_resuming(mut self, store: Arc<dyn UrlStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_resuming_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&dyn UrlStore> {
        self.store.as_deref()
    }

    pub(crate) fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    /// Creates a new upload for `source` on the server.
    ///
    /// The returned uploader starts at offset 0. With resuming enabled the
    /// absolute upload URL is saved under the source fingerprint.
    pub async fn create_upload<'a>(
        &'a self,
        source: &'a mut dyn UploadSource,
    ) -> Result<Uploader<'a>, UploadError> {
        let request = self.creation_request(&*source)?;
        let url = self
            .create(request, source.fingerprint().to_string())
            .await?;
        Uploader::new(
            self,
            UploadSession {
                url,
                offset: 0,
                source,
            },
        )
        .await
    }

    /// Resumes the upload previously created for `source`.
    ///
    /// Fails with [`UploadError::ResumingDisabled`] without a store, and
    /// with [`UploadError::FingerprintNotFound`] when nothing is recorded
    /// for the source.
    pub async fn resume_upload<'a>(
        &'a self,
        source: &'a mut dyn UploadSource,
    ) -> Result<Uploader<'a>, UploadError> {
        let (url, offset) = self.locate(source.fingerprint().to_string()).await?;
        Uploader::new(self, UploadSession { url, offset, source }).await
    }

    /// Resumes the upload for `source` if possible, else creates a new one.
    ///
    /// Falls back to creation when resuming is disabled, nothing is recorded
    /// for the source, or the server answers the offset probe with 404.
    /// Any other failure is returned.
    pub async fn resume_or_create_upload<'a>(
        &'a self,
        source: &'a mut dyn UploadSource,
    ) -> Result<Uploader<'a>, UploadError> {
        let fingerprint = source.fingerprint().to_string();
        match self.locate(fingerprint.clone()).await {
            Ok((url, offset)) => {
                Uploader::new(self, UploadSession { url, offset, source }).await
            }
            Err(UploadError::ResumingDisabled | UploadError::FingerprintNotFound { .. }) => {
                self.create_upload(source).await
            }
            Err(UploadError::Protocol(e)) if e.status() == StatusCode::NOT_FOUND => {
                tracing::info!(%fingerprint, "stored upload no longer exists, creating a new one");
                self.create_upload(source).await
            }
            Err(e) => Err(e),
        }
    }

    /// Sends the creation request and returns the absolute upload URL.
    async fn create(&self, request: HttpRequest, fingerprint: String) -> Result<Url, UploadError> {
        let response = self.transport.send(request).await?;
        let status = response.status;
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus {
                operation: Operation::Create,
                status,
            }
            .into());
        }

        let location = response
            .header(LOCATION.as_str())
            .filter(|l| !l.is_empty())
            .ok_or(ProtocolError::MissingLocation { status })?;

        // Relative to where the creation request actually ended up.
        let url = response
            .url
            .join(location)
            .map_err(|e| UploadError::InvalidUrl(format!("{location}: {e}")))?;

        tracing::info!(%url, %fingerprint, "upload created");

        if let Some(store) = &self.store {
            store.put(&fingerprint, url.as_str())?;
        }
        Ok(url)
    }

    fn creation_request(&self, source: &dyn UploadSource) -> Result<HttpRequest, UploadError> {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static(header::UPLOAD_LENGTH),
            HeaderValue::from(source.size()),
        );

        let metadata = source.metadata().encode();
        if !metadata.is_empty() {
            let value = HeaderValue::from_str(&metadata).map_err(|_| {
                UploadError::InvalidHeader(format!("invalid upload metadata {metadata:?}"))
            })?;
            headers.insert(HeaderName::from_static(header::UPLOAD_METADATA), value);
        }

        Ok(HttpRequest {
            method: Method::POST,
            url: self.endpoint.clone(),
            headers,
        })
    }

    /// Looks up the stored location for `fingerprint` and asks the server
    /// for its current offset.
    async fn locate(&self, fingerprint: String) -> Result<(Url, u64), UploadError> {
        let store = self.store.as_ref().ok_or(UploadError::ResumingDisabled)?;
        let location = store
            .get(&fingerprint)?
            .ok_or(UploadError::FingerprintNotFound { fingerprint })?;

        let url = self
            .endpoint
            .join(&location)
            .map_err(|e| UploadError::InvalidUrl(format!("{location}: {e}")))?;

        let response = self
            .transport
            .send(HttpRequest {
                method: Method::HEAD,
                url: url.clone(),
                headers: self.headers.clone(),
            })
            .await?;

        let status = response.status;
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus {
                operation: Operation::Resume,
                status,
            }
            .into());
        }

        let offset = response
            .header(header::UPLOAD_OFFSET)
            .and_then(parse_offset)
            .ok_or(ProtocolError::MissingOffset {
                operation: Operation::Resume,
                status,
            })?;

        tracing::info!(%url, offset, "resuming upload");
        Ok((url, offset))
    }

    /// Headers and method of a transfer request starting at `offset`.
    pub(crate) fn transfer_request(&self, url: &Url, offset: u64) -> HttpRequest {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static(header::UPLOAD_OFFSET),
            HeaderValue::from(offset),
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_OFFSET_STREAM),
        );
        headers.insert(EXPECT, HeaderValue::from_static("100-continue"));

        let method = if self.config.method_override {
            headers.insert(
                HeaderName::from_static(header::METHOD_OVERRIDE),
                HeaderValue::from_static("PATCH"),
            );
            Method::POST
        } else {
            Method::PATCH
        };

        HttpRequest {
            method,
            url: url.clone(),
            headers,
        }
    }
}
