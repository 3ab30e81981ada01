//! Client for the tus resumable upload protocol.
//!
//! A [`TusClient`] creates uploads on a tus endpoint, or finds where an
//! interrupted upload left off, and hands out an [`Uploader`] that sends the
//! remaining bytes chunk by chunk:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tuskit::{ClientConfig, FileSource, PropertiesStore, TusClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(PropertiesStore::open("uploads.properties")?);
//! let client = TusClient::new(ClientConfig::new("https://tus.example.com/files/"))?
//!     .with_resuming(store);
//!
//! let mut source = FileSource::open("video.mp4").await?;
//! let mut uploader = client.resume_or_create_upload(&mut source).await?;
//! while let Some(sent) = uploader.upload_chunk().await? {
//!     println!("{sent} bytes, {} total", uploader.offset());
//! }
//! uploader.finish().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod transport;
mod uploader;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use client::TusClient;
pub use config::{ClientConfig, ConfigError, RedirectPolicy};
pub use error::{Operation, ProtocolError, UploadError};
pub use transport::{
    BodyWriter, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
    TransportFuture,
};
pub use uploader::{UploadSession, Uploader};

pub use reqwest::{StatusCode, Url};
pub use tuskit_protocol::{Metadata, MetadataError};
pub use tuskit_store::{MemoryStore, PropertiesStore, StoreError, UrlStore};
pub use tuskit_transfer::{FileSource, Fingerprint, MemorySource, TransferError, UploadSource};
