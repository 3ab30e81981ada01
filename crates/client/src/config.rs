//! Client configuration.
//!
//! Usually built in code; can also be read from TOML:
//!
//! ```toml
//! endpoint = "https://tus.example.com/files/"
//! chunk_size = 1048576
//! redirects = "never"
//!
//! [headers]
//! Authorization = "Bearer secret"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tuskit_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_PAYLOAD_SIZE};

/// Errors produced while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How the transport handles redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectPolicy {
    /// Never follow; a 3xx response is reported as an unexpected status.
    Never,
    /// Follow 307 and 308, which keep the request method and body.
    ///
    /// 301/302/303 would turn the creation `POST` into a `GET` and are
    /// reported as an unexpected status instead. `HEAD` requests also
    /// follow 301 and 302, which keep their method.
    #[default]
    PreserveMethod,
}

/// Configuration shared by every upload of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Creation endpoint; stored upload locations are resolved against it.
    pub endpoint: String,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Initial chunk buffer size of new uploaders, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Initial per-request payload limit of new uploaders, in bytes.
    #[serde(default = "default_request_payload_size")]
    pub request_payload_size: u64,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub redirects: RedirectPolicy,

    /// Send transfers as `POST` with `X-HTTP-Method-Override: PATCH`, for
    /// proxies that drop `PATCH`.
    #[serde(default)]
    pub method_override: bool,

    /// Forget the stored location once an upload is confirmed complete.
    #[serde(default)]
    pub remove_fingerprint_on_success: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_request_payload_size() -> u64 {
    DEFAULT_REQUEST_PAYLOAD_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl ClientConfig {
    /// Creates a configuration with default settings for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            chunk_size: default_chunk_size(),
            request_payload_size: default_request_payload_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            redirects: RedirectPolicy::default(),
            method_override: false,
            remove_fingerprint_on_success: false,
        }
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), endpoint = %config.endpoint, "configuration loaded");
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
