use crate::errors::{DepotError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default chunk size for stored model content: 10MB.
///
/// Exposed as a config tunable; every chunk except the last one is exactly
/// this many bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000_000;

/// Default cap on models resident on one node at a time.
pub const DEFAULT_MAX_MODELS_PER_NODE: usize = 10;

/// Depot configuration: storage layout, chunking, and load behavior.
///
/// This struct is serialized to TOML and saved at `~/.depot/depot.toml`.
/// All on-disk state for one model id lives under directories derived from
/// `root_dir`, so cache cleanup is a matter of removing those directories.
///
/// # Examples
///
/// ```
/// use depot::config::DepotConfig;
///
/// let config = DepotConfig::for_root("/tmp/depot".into());
/// assert!(config.upload_dir("m1").ends_with("upload/m1"));
/// assert!(config.deploy_dir("m1").ends_with("deploy/m1"));
/// assert!(config.model_dir("m1").ends_with("models/m1"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Root directory for all depot state
    pub root_dir: PathBuf,

    /// Size of stored model chunks in bytes
    pub chunk_size_bytes: usize,

    /// Run one synthetic inference per predictor at load time
    pub warm_up: bool,

    /// Maximum number of models resident on this node at once
    pub max_models_per_node: usize,
}

impl Default for DepotConfig {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".depot");
        Self::for_root(root)
    }
}

impl DepotConfig {
    /// Create a configuration rooted at the given directory, with defaults
    /// for everything else.
    pub fn for_root(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            warm_up: true,
            max_models_per_node: DEFAULT_MAX_MODELS_PER_NODE,
        }
    }

    /// Get default configuration file path: `~/.depot/depot.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DepotError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".depot").join("depot.toml"))
    }

    /// Staging directory for an in-progress upload of one model.
    pub fn upload_dir(&self, model_id: &str) -> PathBuf {
        self.root_dir.join("upload").join(model_id)
    }

    /// Staging directory for chunk reassembly and the merged package file.
    pub fn deploy_dir(&self, model_id: &str) -> PathBuf {
        self.root_dir.join("deploy").join(model_id)
    }

    /// Working directory the package archive is unpacked into.
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.root_dir.join("models").join(model_id)
    }

    /// Directory for the file-backed document store.
    pub fn store_dir(&self) -> PathBuf {
        self.root_dir.join("store")
    }

    /// Directory for rotating log files.
    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join("logs")
    }

    /// Validate tunables that have hard lower bounds.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(DepotError::Config(
                "chunk_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_models_per_node == 0 {
            return Err(DepotError::Config(
                "max_models_per_node must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file.
    ///
    /// Creates parent directories if they don't exist.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(
                    path = %parent.display(),
                    error = %e,
                    "Failed to create config directory"
                );
                e
            })?;
        }

        let toml_string = toml::to_string_pretty(self)?;

        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &toml_string)?;
        fs::rename(&temp_path, path)?;

        tracing::info!(path = %path.display(), "Depot configuration saved");
        Ok(())
    }

    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to read config file"
            );
            e
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            root = %config.root_dir.display(),
            "Depot configuration loaded"
        );

        Ok(config)
    }

    /// Load the config at the default path, falling back to defaults when
    /// no file exists yet.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
