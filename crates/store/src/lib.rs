//! Fingerprint-to-location stores.
//!
//! A store remembers where an upload was created so that a later process
//! can resume it instead of starting over. The upload client only depends on
//! the [`UrlStore`] trait; [`MemoryStore`] and [`PropertiesStore`] are the
//! two implementations shipped here.

mod memory;
mod properties;

pub use memory::MemoryStore;
pub use properties::PropertiesStore;

/// Errors produced by a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Maps upload fingerprints to upload URLs.
///
/// Implementations must be safe to share between concurrently running
/// uploads. Each call is atomic per key; concurrent writes to the same key
/// resolve as last-write-wins.
pub trait UrlStore: Send + Sync {
    /// Records `url` as the location of the upload identified by `fingerprint`.
    fn put(&self, fingerprint: &str, url: &str) -> Result<(), StoreError>;

    /// Returns the recorded location, if any.
    fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError>;

    /// Forgets `fingerprint`. Removing an unknown key is not an error.
    fn remove(&self, fingerprint: &str) -> Result<(), StoreError>;
}
