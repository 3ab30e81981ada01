use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Strategy used to derive the fingerprint of a file source.
///
/// The fingerprint is the key under which an upload's location is stored
/// for later resumption, so two different payloads must never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fingerprint {
    /// `"<absolute path>-<size>"`. Cheap, but identifies a file by name and
    /// length only: rewriting a file in place without changing its size
    /// keeps the fingerprint.
    #[default]
    PathAndSize,
    /// `"sha256:<hex digest>"` of the whole file. Costs a full read of the
    /// file before the upload starts.
    ContentSha256,
}

impl Fingerprint {
    /// Computes the fingerprint of the file at `path` with length `size`.
    pub async fn compute(self, path: &Path, size: u64) -> Result<String, TransferError> {
        match self {
            Fingerprint::PathAndSize => {
                let absolute = std::path::absolute(path)?;
                Ok(format!("{}-{size}", absolute.display()))
            }
            Fingerprint::ContentSha256 => {
                let path = path.to_path_buf();
                let digest = tokio::task::spawn_blocking(move || calculate_file_checksum(&path))
                    .await
                    .map_err(std::io::Error::other)??;
                Ok(format!("sha256:{digest}"))
            }
        }
    }
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
