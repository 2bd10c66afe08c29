//! SHA-256 content hashing.
//!
//! Inputs are streamed through a fixed buffer so large files are never held
//! in memory. Digests are lowercase hex.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Result;

const READ_BUFFER_SIZE: usize = 8192;

/// Hash everything readable from `reader`.
pub async fn hash_reader<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash the file at `path`.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    hash_reader(&mut file).await
}

/// Hash an in-memory byte slice.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
