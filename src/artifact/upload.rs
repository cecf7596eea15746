//! Upload sessions for the transport-facing ingestion path
//!
//! The transport layer delivers a package chunk by chunk, possibly out of
//! order. An [`UploadSession`] buffers the chunks for one model until the
//! caller finalizes it, at which point indices are validated, the package is
//! assembled, and the content digest is verified (or computed, for locally
//! supplied bytes).

use crate::artifact::{chunk::Chunk, hash, ModelArtifact};
use crate::errors::{DepotError, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// An in-progress chunked upload of one model package.
pub struct UploadSession {
    artifact: ModelArtifact,
    declared_hash: Option<String>,
    chunk_size: usize,
    received: BTreeMap<u32, Vec<u8>>,
}

/// Output of a finalized session: the completed artifact metadata, the
/// canonical chunk sequence, and the assembled package bytes.
pub struct FinalizedUpload {
    pub artifact: ModelArtifact,
    pub chunks: Vec<Chunk>,
    pub bytes: Vec<u8>,
}

impl UploadSession {
    pub(crate) fn new(
        artifact: ModelArtifact,
        declared_hash: Option<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            artifact,
            declared_hash,
            chunk_size,
            received: BTreeMap::new(),
        }
    }

    /// Model id this session is uploading.
    pub fn model_id(&self) -> &str {
        &self.artifact.model_id
    }

    /// Number of chunks buffered so far.
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// Buffer one chunk. Chunks may arrive in any order; delivering the same
    /// index twice is an error.
    pub fn receive_chunk(&mut self, index: u32, bytes: Vec<u8>) -> Result<()> {
        if self.received.contains_key(&index) {
            return Err(DepotError::ChunkIndex {
                model_id: self.artifact.model_id.clone(),
                index,
            });
        }

        debug!(
            model_id = %self.artifact.model_id,
            index = index,
            size = bytes.len(),
            "Received upload chunk"
        );
        self.received.insert(index, bytes);
        Ok(())
    }

    /// Validate, assemble, and digest the buffered chunks.
    ///
    /// Indices must be dense (`0..n`), and every chunk but the last must be
    /// exactly the configured chunk size. With a declared digest the
    /// assembled bytes are verified against it; without one the digest is
    /// computed and stored.
    pub(crate) fn finalize(self) -> Result<FinalizedUpload> {
        let model_id = self.artifact.model_id.clone();
        let total = self.received.len() as u32;

        if total == 0 {
            return Err(DepotError::Config(
                "upload finalized with zero chunks".to_string(),
            ));
        }

        // Dense index check: BTreeMap iteration is ordered, so the keys must
        // be exactly 0..total.
        for (expected, (&index, _)) in self.received.iter().enumerate() {
            if index != expected as u32 {
                return Err(DepotError::ChunkIndex {
                    model_id: model_id.clone(),
                    index,
                });
            }
        }

        let mut bytes = Vec::new();
        let mut chunks = Vec::with_capacity(self.received.len());
        for (&index, content) in &self.received {
            if index != total - 1 && content.len() != self.chunk_size {
                return Err(DepotError::ChunkIndex {
                    model_id: model_id.clone(),
                    index,
                });
            }
            bytes.extend_from_slice(content);
            chunks.push(Chunk {
                model_id: model_id.clone(),
                index,
                bytes: content.clone(),
            });
        }

        let content_hash = match &self.declared_hash {
            Some(declared) => {
                hash::verify(&bytes, declared)?;
                declared.clone()
            }
            None => hash::sha256_hex(&bytes),
        };

        let mut artifact = self.artifact;
        artifact.total_size_bytes = bytes.len() as u64;
        artifact.total_chunks = total;
        artifact.content_hash = content_hash;

        info!(
            model_id = %artifact.model_id,
            size_bytes = artifact.total_size_bytes,
            total_chunks = artifact.total_chunks,
            "Upload finalized"
        );

        Ok(FinalizedUpload {
            artifact,
            chunks,
            bytes,
        })
    }
}

/// Fetch an externally hosted package.
///
/// Used by the URL registration path, where a caller-supplied digest is
/// mandatory before the bytes are trusted.
pub async fn fetch_package(url: &str) -> Result<Vec<u8>> {
    info!(url = %url, "Fetching model package");

    let response = reqwest::get(url)
        .await
        .map_err(|e| DepotError::Http(format!("failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(DepotError::Http(format!(
            "failed to fetch {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DepotError::Http(format!("failed to read body from {}: {}", url, e)))?;

    debug!(url = %url, size = bytes.len(), "Package fetched");
    Ok(bytes.to_vec())
}
