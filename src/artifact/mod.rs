//! Model artifact types and content handling
//!
//! An artifact is the unit of distribution: one compressed package of model
//! bytes plus the metadata needed to verify, chunk, and later reassemble it.
//! The modules here cover the write path (hashing, splitting, upload
//! sessions); reassembly and serving live in [`crate::manager`].

pub mod chunk;
pub mod hash;
pub mod upload;

pub use chunk::{assemble, split, Chunk};
pub use upload::UploadSession;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Native serialization format of the packaged model graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// TorchScript scripted graph (`.pt`)
    TorchScript,
    /// Open Neural Network Exchange graph (`.onnx`)
    Onnx,
}

impl ModelFormat {
    /// File extension the archive loader scans for.
    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::TorchScript => "pt",
            ModelFormat::Onnx => "onnx",
        }
    }

    /// Parse from a user-facing name (CLI input, stored documents).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "torch_script" | "torchscript" | "pt" => Some(ModelFormat::TorchScript),
            "onnx" => Some(ModelFormat::Onnx),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::TorchScript => write!(f, "torch_script"),
            ModelFormat::Onnx => write!(f, "onnx"),
        }
    }
}

/// Application kind of the model.
///
/// The kind drives package-validation rules: whether a native graph file and
/// a tokenizer definition are required in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Text embedding model: needs a graph and a tokenizer
    TextEmbedding,
    /// Tokenizer-only package: no native graph required
    TokenizerOnly,
    /// Generic model: needs a graph, tokenizer optional
    Raw,
}

impl ModelKind {
    /// Whether the package must contain exactly one native model file.
    pub fn requires_model_file(&self) -> bool {
        !matches!(self, ModelKind::TokenizerOnly)
    }

    /// Whether the package must contain a tokenizer definition.
    pub fn requires_tokenizer(&self) -> bool {
        !matches!(self, ModelKind::Raw)
    }

    /// Parse from a user-facing name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text_embedding" | "text-embedding" => Some(ModelKind::TextEmbedding),
            "tokenizer_only" | "tokenizer-only" => Some(ModelKind::TokenizerOnly),
            "raw" => Some(ModelKind::Raw),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::TextEmbedding => write!(f, "text_embedding"),
            ModelKind::TokenizerOnly => write!(f, "tokenizer_only"),
            ModelKind::Raw => write!(f, "raw"),
        }
    }
}

/// Lifecycle state of a model artifact, persisted in the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    Uploading,
    Registered,
    Deploying,
    Deployed,
    DeployFailed,
    Undeployed,
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelState::Uploading => "UPLOADING",
            ModelState::Registered => "REGISTERED",
            ModelState::Deploying => "DEPLOYING",
            ModelState::Deployed => "DEPLOYED",
            ModelState::DeployFailed => "DEPLOY_FAILED",
            ModelState::Undeployed => "UNDEPLOYED",
        };
        write!(f, "{}", name)
    }
}

/// Per-model runtime configuration carried with the artifact metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum input sequence length; sizes the synthetic warm-up input
    pub max_sequence_length: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: 512,
        }
    }
}

/// Caller-supplied fields for registering a new artifact.
#[derive(Debug, Clone)]
pub struct ArtifactMeta {
    /// Human-readable model name
    pub name: String,
    /// Model version string
    pub version: String,
    /// Native serialization format
    pub format: ModelFormat,
    /// Application kind
    pub kind: ModelKind,
    /// Runtime configuration
    pub config: ModelConfig,
}

/// A registered model artifact.
///
/// Identity fields (`content_hash`, `total_size_bytes`, `total_chunks`) are
/// fixed once the artifact reaches [`ModelState::Registered`] and never
/// change afterwards; only `state` moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Unique model identifier
    pub model_id: String,

    /// Human-readable model name
    pub name: String,

    /// Model version string
    pub version: String,

    /// Native serialization format
    pub format: ModelFormat,

    /// Application kind
    pub kind: ModelKind,

    /// Runtime configuration
    pub config: ModelConfig,

    /// Total package size in bytes
    pub total_size_bytes: u64,

    /// Lowercase hex SHA-256 of the whole package
    pub content_hash: String,

    /// Number of stored chunks
    pub total_chunks: u32,

    /// Lifecycle state
    pub state: ModelState,

    /// Registration time, epoch seconds
    pub created_at: u64,
}

impl ModelArtifact {
    /// Create a new artifact in the `Uploading` state with identity fields
    /// still unset.
    pub fn new(model_id: String, meta: ArtifactMeta) -> Self {
        Self {
            model_id,
            name: meta.name,
            version: meta.version,
            format: meta.format,
            kind: meta.kind,
            config: meta.config,
            total_size_bytes: 0,
            content_hash: String::new(),
            total_chunks: 0,
            state: ModelState::Uploading,
            created_at: epoch_seconds(),
        }
    }
}

/// Document id of one stored chunk: `{model_id}_{chunk_index}`.
pub fn chunk_doc_id(model_id: &str, index: u32) -> String {
    format!("{}_{}", model_id, index)
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
