//! Content digest computation and verification
//!
//! SHA-256 is the canonical identity check for model content; the same
//! digest is computed on the write path (registration) and the read path
//! (reassembly before load) so corruption is detected deterministically.

use crate::errors::{DepotError, Result};
use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of a byte blob.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Verify a byte blob against an expected digest.
///
/// A mismatch is fatal for the artifact: the caller must re-upload, never
/// retry with the same bytes.
pub fn verify(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(DepotError::IntegrityMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
