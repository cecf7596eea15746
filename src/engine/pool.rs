//! Per-device predictor pool with round-robin dispatch
//!
//! Loading is all-or-nothing: one predictor replica is constructed for every
//! device the engine enumerates, in enumeration order, and any failure rolls
//! back every handle constructed so far. A partially loaded pool never
//! reaches steady state, so dispatch can assume every slot is usable.
//!
//! After the pool is ready the predictor array never changes; the only
//! shared mutable state on the dispatch path is an atomic cursor, so
//! concurrent calls need no lock.

use super::{Device, EngineKind, LoadSpec, NativeEngine, NativeModel, Predictor};
use crate::archive::PackageLayout;
use crate::artifact::{ModelConfig, ModelKind};
use crate::errors::{DepotError, Result};
use crate::stats::ModelStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info};

/// A model resident in memory with one predictor per local device.
pub struct DeployedModel {
    model_id: String,
    engine_kind: EngineKind,
    devices: Vec<Device>,
    predictors: Vec<Box<dyn Predictor>>,
    models: Vec<Box<dyn NativeModel>>,
    cursor: AtomicUsize,
    stats: ModelStats,
}

impl std::fmt::Debug for DeployedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployedModel")
            .field("model_id", &self.model_id)
            .field("engine_kind", &self.engine_kind)
            .field("devices", &self.devices)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

/// Load one predictor per enumerated device, in enumeration order.
///
/// With `warm_up` set, each predictor serves one synthetic call (sized by
/// the model's configured max sequence length) before it is exposed to
/// traffic. Any device failing construction or warm-up rolls back the whole
/// load.
pub fn load_pool(
    engine: &dyn NativeEngine,
    engine_kind: EngineKind,
    model_id: &str,
    layout: &PackageLayout,
    kind: ModelKind,
    config: &ModelConfig,
    warm_up: bool,
) -> Result<DeployedModel> {
    let devices = engine.devices();
    if devices.is_empty() {
        return Err(DepotError::NoDevicesAvailable(engine_kind.to_string()));
    }

    let spec = LoadSpec {
        model_dir: &layout.root,
        model_file: layout.model_file.as_deref(),
        kind,
        config,
    };

    let mut models: Vec<Box<dyn NativeModel>> = Vec::with_capacity(devices.len());
    let mut predictors: Vec<Box<dyn Predictor>> = Vec::with_capacity(devices.len());

    for (i, device) in devices.iter().enumerate() {
        debug!(model_id = %model_id, device = %device, slot = i, "Loading model onto device");

        match load_one(engine, &spec, *device, warm_up) {
            Ok((model, predictor)) => {
                models.push(model);
                predictors.push(predictor);
            }
            Err(source) => {
                error!(
                    model_id = %model_id,
                    device = %device,
                    error = %source,
                    "Device load failed, rolling back"
                );
                release_handles(model_id, &mut predictors, &mut models);
                return Err(DepotError::PredictorConstruction {
                    device: device.to_string(),
                    source,
                });
            }
        }
    }

    info!(
        model_id = %model_id,
        devices = devices.len(),
        engine = %engine_kind,
        "Model deployed on all devices"
    );

    Ok(DeployedModel {
        model_id: model_id.to_string(),
        engine_kind,
        devices,
        predictors,
        models,
        cursor: AtomicUsize::new(0),
        stats: ModelStats::new(),
    })
}

fn load_one(
    engine: &dyn NativeEngine,
    spec: &LoadSpec<'_>,
    device: Device,
    warm_up: bool,
) -> std::result::Result<(Box<dyn NativeModel>, Box<dyn Predictor>), super::EngineError> {
    let model = engine.load_model(spec, device)?;
    let predictor = model.new_predictor()?;

    if warm_up {
        // First request takes longer; serve one synthetic call before the
        // predictor sees real traffic.
        let synthetic = vec![0u8; spec.config.max_sequence_length as usize];
        predictor.predict(&synthetic)?;
    }

    Ok((model, predictor))
}

/// Release predictors before the model handles that spawned them.
fn release_handles(
    model_id: &str,
    predictors: &mut Vec<Box<dyn Predictor>>,
    models: &mut Vec<Box<dyn NativeModel>>,
) {
    debug!(
        model_id = %model_id,
        count = predictors.len(),
        "Closing predictors"
    );
    predictors.clear();

    debug!(model_id = %model_id, count = models.len(), "Closing model handles");
    models.clear();
}

impl DeployedModel {
    /// Run one inference call on the next predictor in round-robin order.
    pub fn predict(&self, input: &[u8]) -> Result<Vec<u8>> {
        let predictor = self.next_predictor()?;
        let start = Instant::now();

        match predictor.predict(input) {
            Ok(output) => {
                self.stats
                    .record_success(start.elapsed().as_micros() as u64);
                Ok(output)
            }
            Err(source) => {
                self.stats.record_failure();
                Err(DepotError::Inference {
                    model_id: self.model_id.clone(),
                    source,
                })
            }
        }
    }

    /// Pick the next predictor: atomic increment, modulo device count.
    fn next_predictor(&self) -> Result<&dyn Predictor> {
        let count = self.predictors.len();
        if count == 0 {
            // Unreachable by construction; a bug, not a transient condition.
            return Err(DepotError::Dispatch(format!(
                "empty predictor pool for model {}",
                self.model_id
            )));
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        Ok(self.predictors[slot].as_ref())
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine_kind
    }

    /// Devices the model is resident on, in load order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }
}

impl Drop for DeployedModel {
    fn drop(&mut self) {
        let mut predictors = std::mem::take(&mut self.predictors);
        let mut models = std::mem::take(&mut self.models);
        release_handles(&self.model_id, &mut predictors, &mut models);
    }
}
