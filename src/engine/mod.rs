//! Native runtime abstraction and engine registry
//!
//! The numerical runtimes that actually execute model graphs are external to
//! the depot. This module defines the seam: a [`NativeEngine`] enumerates
//! devices and loads one model handle per device, a [`NativeModel`] spawns
//! predictors bound to its device, and a [`Predictor`] serves inference
//! calls. Implementations are registered in an [`EngineRegistry`] built at
//! process start — an explicit closed map from engine kind to
//! implementation, with an `init`/`shutdown` lifecycle instead of any
//! runtime reflection.
//!
//! ```text
//! ModelManager
//!       │ resolve(kind)
//!       ▼
//! ┌───────────────────────────────────────┐
//! │            EngineRegistry             │
//! │  TorchScript ─► engine impl           │
//! │  Onnx        ─► engine impl           │
//! └───────────────────────────────────────┘
//!       │ devices() / load_model()
//!       ▼
//! ┌───────────────────────────────────────┐
//! │   one NativeModel + Predictor pair    │
//! │           per enumerated device       │
//! └───────────────────────────────────────┘
//! ```

pub mod device;
pub mod pool;
pub mod stub;

pub use device::Device;
pub use pool::{load_pool, DeployedModel};
pub use stub::StubEngine;

use crate::artifact::{ModelConfig, ModelFormat, ModelKind};
use crate::errors::{DepotError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Error type native runtime implementations report through the seam.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// The closed set of supported native runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    TorchScript,
    Onnx,
}

impl From<ModelFormat> for EngineKind {
    fn from(format: ModelFormat) -> Self {
        match format {
            ModelFormat::TorchScript => EngineKind::TorchScript,
            ModelFormat::Onnx => EngineKind::Onnx,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::TorchScript => write!(f, "torch_script"),
            EngineKind::Onnx => write!(f, "onnx"),
        }
    }
}

/// Everything an engine needs to load one model onto one device.
pub struct LoadSpec<'a> {
    /// Unpacked package directory
    pub model_dir: &'a Path,

    /// The normalized native model file, when the kind requires one
    pub model_file: Option<&'a Path>,

    /// Application kind
    pub kind: ModelKind,

    /// Runtime configuration
    pub config: &'a ModelConfig,
}

/// A model graph loaded onto one device by a native runtime.
pub trait NativeModel: Send + Sync {
    /// Construct a predictor bound to this model's device.
    fn new_predictor(&self) -> std::result::Result<Box<dyn Predictor>, EngineError>;

    /// The device this handle lives on.
    fn device(&self) -> Device;
}

/// A ready inference replica.
pub trait Predictor: Send + Sync {
    /// Run one inference call.
    fn predict(&self, input: &[u8]) -> std::result::Result<Vec<u8>, EngineError>;

    /// The device this predictor is bound to.
    fn device(&self) -> Device;
}

/// One native runtime implementation.
pub trait NativeEngine: Send + Sync {
    /// Devices this runtime exposes on the local node, in a stable order.
    fn devices(&self) -> Vec<Device>;

    /// Load the model onto one device.
    fn load_model(
        &self,
        spec: &LoadSpec<'_>,
        device: Device,
    ) -> std::result::Result<Box<dyn NativeModel>, EngineError>;
}

/// Process-scoped registry mapping engine kinds to implementations.
///
/// Populated once at startup via [`EngineRegistry::register`]; lookups after
/// that only take the read side of the lock. `shutdown` empties the map at
/// teardown.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<EngineKind, Arc<dyn NativeEngine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-process stub engine wired for both kinds.
    ///
    /// Used by tests and by deployments without a linked native runtime.
    pub fn with_stub_engines(device_count: usize) -> Self {
        let registry = Self::new();
        registry.register(
            EngineKind::TorchScript,
            Arc::new(StubEngine::new(device_count)),
        );
        registry.register(EngineKind::Onnx, Arc::new(StubEngine::new(device_count)));
        registry
    }

    /// Register an engine implementation for a kind, replacing any previous
    /// registration.
    pub fn register(&self, kind: EngineKind, engine: Arc<dyn NativeEngine>) {
        let mut engines = self.engines.write().expect("engine registry lock poisoned");
        engines.insert(kind, engine);
        info!(engine = %kind, "Registered engine");
    }

    /// Remove the implementation for a kind.
    pub fn deregister(&self, kind: EngineKind) {
        let mut engines = self.engines.write().expect("engine registry lock poisoned");
        if engines.remove(&kind).is_some() {
            debug!(engine = %kind, "Deregistered engine");
        }
    }

    /// Look up the implementation for a kind.
    pub fn resolve(&self, kind: EngineKind) -> Result<Arc<dyn NativeEngine>> {
        let engines = self.engines.read().expect("engine registry lock poisoned");
        engines
            .get(&kind)
            .cloned()
            .ok_or_else(|| DepotError::UnsupportedEngine(kind.to_string()))
    }

    /// Drop every registered engine at process teardown.
    pub fn shutdown(&self) {
        let mut engines = self.engines.write().expect("engine registry lock poisoned");
        let count = engines.len();
        engines.clear();
        info!(engines = count, "Engine registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_format() {
        assert_eq!(
            EngineKind::from(ModelFormat::TorchScript),
            EngineKind::TorchScript
        );
        assert_eq!(EngineKind::from(ModelFormat::Onnx), EngineKind::Onnx);
    }

    #[test]
    fn test_registry_resolve_unregistered() {
        let registry = EngineRegistry::new();
        assert!(matches!(
            registry.resolve(EngineKind::Onnx),
            Err(DepotError::UnsupportedEngine(_))
        ));
    }

    #[test]
    fn test_registry_register_and_resolve() {
        let registry = EngineRegistry::new();
        registry.register(EngineKind::Onnx, Arc::new(StubEngine::new(1)));
        assert!(registry.resolve(EngineKind::Onnx).is_ok());
        assert!(registry.resolve(EngineKind::TorchScript).is_err());
    }

    #[test]
    fn test_registry_deregister() {
        let registry = EngineRegistry::with_stub_engines(1);
        registry.deregister(EngineKind::Onnx);
        assert!(registry.resolve(EngineKind::Onnx).is_err());
        assert!(registry.resolve(EngineKind::TorchScript).is_ok());
    }

    #[test]
    fn test_registry_shutdown_clears_all() {
        let registry = EngineRegistry::with_stub_engines(2);
        registry.shutdown();
        assert!(registry.resolve(EngineKind::Onnx).is_err());
        assert!(registry.resolve(EngineKind::TorchScript).is_err());
    }
}
