//! Document store interfaces for model metadata and chunk content
//!
//! The depot does not own persistent storage; metadata and chunk documents
//! live in an external key-value document store. These traits are the
//! boundary. Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: in-process maps, used by tests
//! - [`FsStore`]: JSON documents under a storage directory, used by the CLI
//!
//! Chunk documents carry their content base64-encoded, keyed by
//! `{model_id}_{chunk_index}`.

use crate::artifact::{chunk::Chunk, chunk_doc_id, ModelArtifact, ModelState};
use crate::errors::{DepotError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// Store for model metadata documents, keyed by model id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create or replace the metadata document for a model.
    async fn put_model(&self, artifact: &ModelArtifact) -> Result<()>;

    /// Fetch the metadata document for a model.
    async fn get_model(&self, model_id: &str) -> Result<Option<ModelArtifact>>;

    /// Update only the lifecycle state of a model.
    async fn update_state(&self, model_id: &str, state: ModelState) -> Result<()>;

    /// Delete the metadata document for a model.
    async fn delete_model(&self, model_id: &str) -> Result<()>;
}

/// Store for chunk documents, keyed by `{model_id}_{chunk_index}`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist one chunk document.
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Fetch one chunk document, `None` if absent.
    async fn get_chunk(&self, model_id: &str, index: u32) -> Result<Option<Chunk>>;

    /// Delete every chunk document belonging to a model.
    async fn delete_chunks(&self, model_id: &str) -> Result<()>;
}

/// Stored form of one chunk: content is base64 so the document is valid JSON.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkDocument {
    model_id: String,
    index: u32,
    content: String,
}

impl ChunkDocument {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            model_id: chunk.model_id.clone(),
            index: chunk.index,
            content: BASE64.encode(&chunk.bytes),
        }
    }

    fn into_chunk(self) -> Result<Chunk> {
        let bytes = BASE64
            .decode(&self.content)
            .map_err(|e| DepotError::Storage(format!("invalid chunk encoding: {}", e)))?;
        Ok(Chunk {
            model_id: self.model_id,
            index: self.index,
            bytes,
        })
    }
}

/// In-memory store used by tests.
#[derive(Default)]
pub struct MemoryStore {
    models: RwLock<HashMap<String, ModelArtifact>>,
    chunks: RwLock<HashMap<String, ChunkDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of model documents held. Test helper.
    pub async fn model_count(&self) -> usize {
        self.models.read().await.len()
    }

    /// Number of chunk documents held. Test helper.
    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn put_model(&self, artifact: &ModelArtifact) -> Result<()> {
        let mut models = self.models.write().await;
        models.insert(artifact.model_id.clone(), artifact.clone());
        Ok(())
    }

    async fn get_model(&self, model_id: &str) -> Result<Option<ModelArtifact>> {
        let models = self.models.read().await;
        Ok(models.get(model_id).cloned())
    }

    async fn update_state(&self, model_id: &str, state: ModelState) -> Result<()> {
        let mut models = self.models.write().await;
        match models.get_mut(model_id) {
            Some(artifact) => {
                artifact.state = state;
                Ok(())
            }
            None => Err(DepotError::ModelNotFound(model_id.to_string())),
        }
    }

    async fn delete_model(&self, model_id: &str) -> Result<()> {
        let mut models = self.models.write().await;
        models.remove(model_id);
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut chunks = self.chunks.write().await;
        chunks.insert(
            chunk_doc_id(&chunk.model_id, chunk.index),
            ChunkDocument::from_chunk(chunk),
        );
        Ok(())
    }

    async fn get_chunk(&self, model_id: &str, index: u32) -> Result<Option<Chunk>> {
        let chunks = self.chunks.read().await;
        match chunks.get(&chunk_doc_id(model_id, index)) {
            Some(doc) => {
                let bytes = BASE64
                    .decode(&doc.content)
                    .map_err(|e| DepotError::Storage(format!("invalid chunk encoding: {}", e)))?;
                Ok(Some(Chunk {
                    model_id: doc.model_id.clone(),
                    index: doc.index,
                    bytes,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_chunks(&self, model_id: &str) -> Result<()> {
        let mut chunks = self.chunks.write().await;
        let prefix = format!("{}_", model_id);
        chunks.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}

/// File-backed store: one JSON document per key under a storage directory.
///
/// Model documents are `<model_id>.model.json`; chunk documents are
/// `<model_id>_<index>.chunk.json`.
pub struct FsStore {
    storage_path: PathBuf,
}

impl FsStore {
    /// Create a file-backed store rooted at the given directory.
    pub fn new(storage_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_path)?;
        Ok(Self { storage_path })
    }

    fn model_path(&self, model_id: &str) -> PathBuf {
        self.storage_path.join(format!("{}.model.json", model_id))
    }

    fn chunk_path(&self, model_id: &str, index: u32) -> PathBuf {
        self.storage_path
            .join(format!("{}.chunk.json", chunk_doc_id(model_id, index)))
    }

    /// List every model document in the store.
    pub async fn list_models(&self) -> Result<Vec<ModelArtifact>> {
        let mut models = Vec::new();
        for entry in std::fs::read_dir(&self.storage_path)? {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(".model.json") {
                continue;
            }
            let data = std::fs::read_to_string(entry.path())?;
            models.push(serde_json::from_str(&data)?);
        }
        models.sort_by(|a: &ModelArtifact, b: &ModelArtifact| a.created_at.cmp(&b.created_at));
        Ok(models)
    }
}

#[async_trait]
impl MetadataStore for FsStore {
    async fn put_model(&self, artifact: &ModelArtifact) -> Result<()> {
        let data = serde_json::to_string_pretty(artifact)?;
        std::fs::write(self.model_path(&artifact.model_id), data)?;
        debug!(model_id = %artifact.model_id, "Saved model document");
        Ok(())
    }

    async fn get_model(&self, model_id: &str) -> Result<Option<ModelArtifact>> {
        let path = self.model_path(model_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let artifact: ModelArtifact = serde_json::from_str(&data)?;
        Ok(Some(artifact))
    }

    async fn update_state(&self, model_id: &str, state: ModelState) -> Result<()> {
        let mut artifact = self
            .get_model(model_id)
            .await?
            .ok_or_else(|| DepotError::ModelNotFound(model_id.to_string()))?;
        artifact.state = state;
        self.put_model(&artifact).await
    }

    async fn delete_model(&self, model_id: &str) -> Result<()> {
        let path = self.model_path(model_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for FsStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
        let doc = ChunkDocument::from_chunk(chunk);
        let data = serde_json::to_string(&doc)?;
        std::fs::write(self.chunk_path(&chunk.model_id, chunk.index), data)?;
        Ok(())
    }

    async fn get_chunk(&self, model_id: &str, index: u32) -> Result<Option<Chunk>> {
        let path = self.chunk_path(model_id, index);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let doc: ChunkDocument = serde_json::from_str(&data)?;
        Ok(Some(doc.into_chunk()?))
    }

    async fn delete_chunks(&self, model_id: &str) -> Result<()> {
        let prefix = format!("{}_", model_id);
        for entry in std::fs::read_dir(&self.storage_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".chunk.json") {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}
