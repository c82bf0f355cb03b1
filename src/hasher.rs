//! Content digests for schematic files.
//!
//! Digests are SHA-256 over the raw file bytes, rendered as 64 lowercase hex
//! characters so they can be stored as plain string attributes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ProviderError;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Digest an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest the contents of the file at `path`.
///
/// The file is streamed in 1 MiB chunks. Opening or reading failures are
/// returned as [`ProviderError::Io`] naming the path.
pub fn hash_file(path: &Path) -> Result<String, ProviderError> {
    let mut file = File::open(path).map_err(|e| ProviderError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buffer).map_err(|e| ProviderError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    let digest = format!("{:x}", hasher.finalize());
    debug!(path = %path.display(), bytes = total, digest = %digest, "Hashed file");
    Ok(digest)
}
