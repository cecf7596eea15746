//! Model manager: the facade over the whole distribution pipeline
//!
//! The manager owns the deployed-model map for this node and drives every
//! model operation end to end:
//!
//! ```text
//! register (bytes / chunks / URL)
//!   └─► verify digest ─► split ─► chunk store + metadata (REGISTERED)
//!
//! deploy
//!   └─► fetch chunks ─► assemble ─► verify digest ─► unpack package
//!       ─► resolve engine ─► one predictor per device ─► DEPLOYED
//!
//! predict
//!   └─► round-robin dispatch over the resident pool
//!
//! undeploy
//!   └─► release predictors, then model handles ─► delete disk caches
//! ```
//!
//! Any deploy failure rolls the node back to a clean state: no resident
//! handles, no leftover staging directories, metadata marked
//! `DEPLOY_FAILED`.

use crate::artifact::{
    chunk::{self, Chunk},
    hash, upload, ArtifactMeta, ModelArtifact, ModelState, UploadSession,
};
use crate::config::DepotConfig;
use crate::engine::{load_pool, DeployedModel, Device, EngineKind, EngineRegistry};
use crate::errors::{DepotError, Result};
use crate::lifecycle;
use crate::stats::StatsSnapshot;
use crate::store::{ChunkStore, MetadataStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Result of an undeploy request for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndeployOutcome {
    /// The model was resident and has been released
    Unloaded,
    /// The model was not resident on this node
    NotFound,
}

impl std::fmt::Display for UndeployOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndeployOutcome::Unloaded => write!(f, "UNLOADED"),
            UndeployOutcome::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// Manager for model artifacts on one serving node.
pub struct ModelManager {
    config: DepotConfig,
    metadata: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    engines: Arc<EngineRegistry>,
    deployed: RwLock<HashMap<String, Arc<DeployedModel>>>,
}

impl ModelManager {
    pub fn new(
        config: DepotConfig,
        metadata: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        engines: Arc<EngineRegistry>,
    ) -> Self {
        // Nothing is resident yet, so any working directory left behind by a
        // previous process is stale
        lifecycle::sweep_stale_caches(&config, &std::collections::HashSet::new());

        Self {
            config,
            metadata,
            chunks,
            engines,
            deployed: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DepotConfig {
        &self.config
    }

    // === Registration paths ===

    /// Open a chunked upload session for a new model.
    ///
    /// The metadata document is created immediately in the `UPLOADING`
    /// state; identity fields are filled in at finalize time.
    pub async fn begin_upload(
        &self,
        meta: ArtifactMeta,
        declared_hash: Option<String>,
    ) -> Result<UploadSession> {
        let model_id = Uuid::new_v4().to_string();
        let artifact = ModelArtifact::new(model_id.clone(), meta);
        self.metadata.put_model(&artifact).await?;

        info!(model_id = %model_id, name = %artifact.name, "Created model document, upload started");
        Ok(UploadSession::new(
            artifact,
            declared_hash,
            self.config.chunk_size_bytes,
        ))
    }

    /// Assemble, verify, and persist a finished upload session.
    pub async fn finalize_upload(&self, session: UploadSession) -> Result<ModelArtifact> {
        let model_id = session.model_id().to_string();

        let result = match session.finalize() {
            Ok(finalized) => {
                self.persist_registered(finalized.artifact, finalized.chunks)
                    .await
            }
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.discard_artifact(&model_id).await;
        }
        result
    }

    /// Register a model from locally supplied package bytes.
    ///
    /// Without a declared digest the digest is computed and stored; with one
    /// the bytes are verified first.
    pub async fn register_from_bytes(
        &self,
        meta: ArtifactMeta,
        bytes: &[u8],
        declared_hash: Option<String>,
    ) -> Result<ModelArtifact> {
        let model_id = Uuid::new_v4().to_string();
        let mut artifact = ModelArtifact::new(model_id.clone(), meta);
        self.metadata.put_model(&artifact).await?;

        let result = async {
            let content_hash = match declared_hash {
                Some(declared) => {
                    hash::verify(bytes, &declared)?;
                    declared
                }
                None => hash::sha256_hex(bytes),
            };

            let chunks = chunk::split(&model_id, bytes, self.config.chunk_size_bytes)?;
            artifact.total_size_bytes = bytes.len() as u64;
            artifact.total_chunks = chunks.len() as u32;
            artifact.content_hash = content_hash;

            self.persist_registered(artifact, chunks).await
        }
        .await;

        if result.is_err() {
            self.discard_artifact(&model_id).await;
        }
        result
    }

    /// Register a model from an externally hosted package URL.
    ///
    /// A caller-supplied digest is mandatory on this path; the downloaded
    /// bytes are never trusted without it.
    pub async fn register_from_url(
        &self,
        meta: ArtifactMeta,
        url: &str,
        declared_hash: Option<String>,
    ) -> Result<ModelArtifact> {
        let declared = declared_hash.ok_or(DepotError::MissingDigest)?;
        let bytes = upload::fetch_package(url).await?;
        self.register_from_bytes(meta, &bytes, Some(declared)).await
    }

    async fn persist_registered(
        &self,
        mut artifact: ModelArtifact,
        chunks: Vec<Chunk>,
    ) -> Result<ModelArtifact> {
        for chunk in &chunks {
            if let Err(e) = self.chunks.put_chunk(chunk).await {
                error!(
                    model_id = %artifact.model_id,
                    index = chunk.index,
                    error = %e,
                    "Failed to persist model chunk"
                );
                return Err(e);
            }
        }

        artifact.state = ModelState::Registered;
        self.metadata.put_model(&artifact).await?;

        info!(
            model_id = %artifact.model_id,
            size_bytes = artifact.total_size_bytes,
            total_chunks = artifact.total_chunks,
            "Model registered"
        );
        Ok(artifact)
    }

    /// Best-effort removal of a partially registered artifact.
    async fn discard_artifact(&self, model_id: &str) {
        let _ = self.metadata.delete_model(model_id).await;
        let _ = self.chunks.delete_chunks(model_id).await;
        lifecycle::cleanup_caches(&self.config, model_id);
    }

    // === Replication path ===

    /// Fetch one stored chunk, for chunk-by-chunk replication to peers.
    pub async fn fetch_chunk(&self, model_id: &str, index: u32) -> Result<Vec<u8>> {
        let artifact = self
            .metadata
            .get_model(model_id)
            .await?
            .ok_or_else(|| DepotError::ModelNotFound(model_id.to_string()))?;

        if index >= artifact.total_chunks {
            return Err(DepotError::ChunkIndex {
                model_id: model_id.to_string(),
                index,
            });
        }

        let chunk = self
            .chunks
            .get_chunk(model_id, index)
            .await?
            .ok_or_else(|| DepotError::ChunkNotFound {
                model_id: model_id.to_string(),
                index,
            })?;
        Ok(chunk.bytes)
    }

    // === Deploy path ===

    /// Reassemble, verify, unpack, and load a registered model onto every
    /// local device. A no-op when the model is already resident.
    pub async fn deploy(&self, model_id: &str) -> Result<()> {
        {
            let deployed = self.deployed.read().await;
            if deployed.contains_key(model_id) {
                debug!(model_id = %model_id, "Model already deployed");
                return Ok(());
            }
            if deployed.len() >= self.config.max_models_per_node {
                return Err(DepotError::LimitExceeded(format!(
                    "{} models already deployed (max {})",
                    deployed.len(),
                    self.config.max_models_per_node
                )));
            }
        }

        let artifact = self
            .metadata
            .get_model(model_id)
            .await?
            .ok_or_else(|| DepotError::ModelNotFound(model_id.to_string()))?;

        self.metadata
            .update_state(model_id, ModelState::Deploying)
            .await?;

        match self.deploy_inner(&artifact).await {
            Ok(pool) => {
                {
                    let mut deployed = self.deployed.write().await;
                    // A concurrent deploy may have won the race; the loser's
                    // pool is released on drop.
                    deployed.entry(model_id.to_string()).or_insert(pool);
                }
                self.metadata
                    .update_state(model_id, ModelState::Deployed)
                    .await?;
                // Bytes are resident now; stale disk copies are dead weight
                lifecycle::cleanup_caches(&self.config, model_id);
                info!(model_id = %model_id, "Model deployed");
                Ok(())
            }
            Err(e) => {
                error!(model_id = %model_id, error = %e, "Deploy failed");
                lifecycle::cleanup_caches(&self.config, model_id);
                let _ = self
                    .metadata
                    .update_state(model_id, ModelState::DeployFailed)
                    .await;
                Err(e)
            }
        }
    }

    async fn deploy_inner(&self, artifact: &ModelArtifact) -> Result<Arc<DeployedModel>> {
        let model_id = &artifact.model_id;

        // Pull every chunk back from the store
        let mut chunks = Vec::with_capacity(artifact.total_chunks as usize);
        for index in 0..artifact.total_chunks {
            let chunk = self
                .chunks
                .get_chunk(model_id, index)
                .await?
                .ok_or_else(|| DepotError::ChunkNotFound {
                    model_id: model_id.clone(),
                    index,
                })?;
            chunks.push(chunk);
        }
        debug!(model_id = %model_id, chunks = chunks.len(), "Retrieved model chunks");

        let bytes = chunk::assemble(artifact.total_chunks, chunks)?;

        // The reassembled content must match the registered digest exactly
        hash::verify(&bytes, &artifact.content_hash)?;
        debug!(model_id = %model_id, "Model content matches registered hash");

        let deploy_dir = self.config.deploy_dir(model_id);
        std::fs::create_dir_all(&deploy_dir)?;
        let package_path = deploy_dir.join(format!("{}.zip", model_id));
        std::fs::write(&package_path, &bytes)?;
        drop(bytes);

        let layout = crate::archive::unpack(
            &package_path,
            &self.config.model_dir(model_id),
            model_id,
            artifact.kind,
        )?;

        let engine_kind = EngineKind::from(artifact.format);
        let engine = self.engines.resolve(engine_kind)?;

        let pool = load_pool(
            engine.as_ref(),
            engine_kind,
            model_id,
            &layout,
            artifact.kind,
            &artifact.config,
            self.config.warm_up,
        )?;

        Ok(Arc::new(pool))
    }

    // === Inference path ===

    /// Dispatch one inference call to the model's predictor pool.
    pub async fn predict(&self, model_id: &str, input: &[u8]) -> Result<Vec<u8>> {
        let pool = {
            let deployed = self.deployed.read().await;
            deployed
                .get(model_id)
                .cloned()
                .ok_or_else(|| DepotError::ModelNotDeployed(model_id.to_string()))?
        };
        pool.predict(input)
    }

    // === Undeploy path ===

    /// Release a resident model and delete its disk caches. Idempotent.
    pub async fn undeploy(&self, model_id: &str) -> Result<UndeployOutcome> {
        let removed = {
            let mut deployed = self.deployed.write().await;
            deployed.remove(model_id)
        };

        lifecycle::cleanup_caches(&self.config, model_id);

        match removed {
            Some(pool) => {
                // Dropping the pool releases predictors, then model handles
                drop(pool);
                if self.metadata.get_model(model_id).await?.is_some() {
                    self.metadata
                        .update_state(model_id, ModelState::Undeployed)
                        .await?;
                }
                info!(model_id = %model_id, "Model undeployed");
                Ok(UndeployOutcome::Unloaded)
            }
            None => {
                debug!(model_id = %model_id, "Undeploy for model not resident");
                Ok(UndeployOutcome::NotFound)
            }
        }
    }

    /// Undeploy everything and clear the engine registry.
    pub async fn shutdown(&self) {
        let model_ids: Vec<String> = {
            let deployed = self.deployed.read().await;
            deployed.keys().cloned().collect()
        };
        for model_id in model_ids {
            let _ = self.undeploy(&model_id).await;
        }
        self.engines.shutdown();
    }

    // === Introspection ===

    pub async fn is_deployed(&self, model_id: &str) -> bool {
        let deployed = self.deployed.read().await;
        deployed.contains_key(model_id)
    }

    pub async fn deployed_models(&self) -> Vec<String> {
        let deployed = self.deployed.read().await;
        deployed.keys().cloned().collect()
    }

    /// Devices a resident model is loaded on, in load order.
    pub async fn devices(&self, model_id: &str) -> Option<Vec<Device>> {
        let deployed = self.deployed.read().await;
        deployed.get(model_id).map(|p| p.devices().to_vec())
    }

    pub async fn stats(&self, model_id: &str) -> Option<StatsSnapshot> {
        let deployed = self.deployed.read().await;
        deployed.get(model_id).map(|p| p.stats().snapshot())
    }

    pub async fn artifact(&self, model_id: &str) -> Result<Option<ModelArtifact>> {
        self.metadata.get_model(model_id).await
    }
}
