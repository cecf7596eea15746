//! Chunk splitting and reassembly
//!
//! Model packages are stored and replicated as fixed-size chunks. Splitting
//! is deterministic: identical bytes and chunk size always produce identical
//! chunk sequences. The assembler keys on chunk index, not arrival order, so
//! out-of-order delivery from the transport layer is fine.

use crate::errors::{DepotError, Result};

/// One stored chunk of a model package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Model this chunk belongs to
    pub model_id: String,

    /// Position in the package, 0-based and dense
    pub index: u32,

    /// Raw chunk content
    pub bytes: Vec<u8>,
}

/// Split a package into chunks of `chunk_size` bytes.
///
/// Every chunk except the last has length exactly `chunk_size`; the last
/// carries the remainder. Empty input yields an empty chunk sequence.
pub fn split(model_id: &str, bytes: &[u8], chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(DepotError::Config(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let chunks = bytes
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, part)| Chunk {
            model_id: model_id.to_string(),
            index: i as u32,
            bytes: part.to_vec(),
        })
        .collect();

    Ok(chunks)
}

/// Reassemble the original package from its chunks.
///
/// The chunk sequence may arrive in any order; it is sorted by index before
/// concatenation. Fails if the count differs from `expected_total` or if any
/// index is duplicated or out of range.
pub fn assemble(expected_total: u32, mut chunks: Vec<Chunk>) -> Result<Vec<u8>> {
    if chunks.len() as u32 != expected_total {
        return Err(DepotError::ChunkCountMismatch {
            expected: expected_total,
            actual: chunks.len() as u32,
        });
    }

    chunks.sort_by_key(|c| c.index);

    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.bytes.len()).sum());
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.index != i as u32 {
            return Err(DepotError::ChunkIndex {
                model_id: chunk.model_id.clone(),
                index: chunk.index,
            });
        }
        out.extend_from_slice(&chunk.bytes);
    }

    Ok(out)
}

/// Number of chunks a package of `len` bytes splits into.
pub fn chunk_count(len: u64, chunk_size: usize) -> u32 {
    len.div_ceil(chunk_size as u64) as u32
}
