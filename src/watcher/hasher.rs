//! Streaming content fingerprints.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::HashError;

/// Read size per chunk. Memory use is bounded by this regardless of file size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Content digest of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lower-case hex BLAKE3 digest, 64 characters.
    pub hex: String,
    /// Number of bytes hashed.
    pub bytes: u64,
}

/// Hash a file in [`CHUNK_SIZE`] chunks.
///
/// # Errors
///
/// Returns [`HashError::NotFound`] if the file is gone (including mid-read),
/// [`HashError::PermissionDenied`] if it cannot be opened, or
/// [`HashError::Other`] for any other read failure.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }

    Ok(Fingerprint {
        hex: hasher.finalize().to_hex().to_string(),
        bytes,
    })
}
