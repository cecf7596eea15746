use thiserror::Error;

/// Package validation failures surfaced by the archive loader.
///
/// These are terminal for the artifact: retrying with the same bytes
/// reproduces the same error, so the caller must fix the package and
/// re-register it.
#[derive(Error, Debug)]
pub enum PackagingError {
    /// Archive could not be read or contains unsafe entries
    #[error("malformed package archive: {0}")]
    MalformedArchive(String),

    /// No native model file found where the model kind requires one
    #[error("no model file found in package")]
    NoModelFile,

    /// More than one native model file in the package
    #[error("found multiple model files in package")]
    MultipleModelFiles,

    /// Required tokenizer side file is absent
    #[error("tokenizer file missing from package")]
    MissingTokenizer,
}

/// Errors that can occur in the depot.
#[derive(Error, Debug)]
pub enum DepotError {
    /// IO error occurred (file operations, staging directories, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content digest did not match the declared digest
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Registration path requires a caller-supplied digest
    #[error("a content hash is required when registering from a URL")]
    MissingDigest,

    /// Assembler was handed the wrong number of chunks
    #[error("chunk count mismatch: expected {expected}, got {actual}")]
    ChunkCountMismatch { expected: u32, actual: u32 },

    /// Duplicate or out-of-range chunk index
    #[error("bad chunk index {index} for model {model_id}")]
    ChunkIndex { model_id: String, index: u32 },

    /// A stored chunk could not be found
    #[error("chunk {index} of model {model_id} not found")]
    ChunkNotFound { model_id: String, index: u32 },

    /// Package archive failed validation
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// Requested native runtime is not registered
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// Native runtime reported zero usable devices
    #[error("no devices available for engine {0}")]
    NoDevicesAvailable(String),

    /// Predictor construction failed on a device; the whole load is rolled back
    #[error("failed to construct predictor on device {device}: {source}")]
    PredictorConstruction {
        device: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Dispatch invariant breach. Not a transient condition; indicates a bug.
    #[error("dispatch invariant violated: {0}")]
    Dispatch(String),

    /// Inference call failed on the selected predictor
    #[error("inference failed for model {model_id}: {source}")]
    Inference {
        model_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No metadata document for the given model id
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Model is registered but not resident on this node
    #[error("model not deployed: {0}")]
    ModelNotDeployed(String),

    /// Per-node resource limit reached
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Document store error
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error (invalid config, missing fields, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP error while fetching an externally hosted package
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for depot operations.
pub type Result<T> = std::result::Result<T, DepotError>;

impl From<serde_json::Error> for DepotError {
    fn from(e: serde_json::Error) -> Self {
        DepotError::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for DepotError {
    fn from(e: toml::ser::Error) -> Self {
        DepotError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for DepotError {
    fn from(e: toml::de::Error) -> Self {
        DepotError::Serialization(e.to_string())
    }
}

impl From<zip::result::ZipError> for DepotError {
    fn from(e: zip::result::ZipError) -> Self {
        DepotError::Packaging(PackagingError::MalformedArchive(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DepotError::IntegrityMismatch {
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        assert_eq!(err.to_string(), "content hash mismatch: expected abc, got def");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let depot_err: DepotError = io_err.into();
        assert!(depot_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_packaging_error_conversion() {
        let err: DepotError = PackagingError::MultipleModelFiles.into();
        assert_eq!(err.to_string(), "found multiple model files in package");
    }

    #[test]
    fn test_predictor_construction_preserves_source() {
        let source: Box<dyn std::error::Error + Send + Sync> = "out of device memory".into();
        let err = DepotError::PredictorConstruction {
            device: "cuda:1".to_string(),
            source,
        };
        assert!(err.to_string().contains("cuda:1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
