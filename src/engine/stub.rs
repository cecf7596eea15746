//! In-process stub engine
//!
//! A deterministic engine implementation used by tests and by deployments
//! without a linked native runtime. It exercises the full load/dispatch/
//! teardown pipeline against real files on disk, supports scripted
//! per-device failures, and keeps open-handle accounting so tests can assert
//! that rollback leaks nothing.
//!
//! Inference output is deterministic: the device label plus a digest of the
//! input, so dispatch tests can observe which replica served a call.

use super::{Device, EngineError, LoadSpec, NativeEngine, NativeModel, Predictor};
use crate::artifact::hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Open-handle accounting shared by every handle a [`StubEngine`] creates.
#[derive(Debug, Default)]
pub struct StubCounters {
    /// Model handles currently open
    pub models_open: AtomicUsize,

    /// Predictors currently open
    pub predictors_open: AtomicUsize,

    /// Total inference calls served (warm-up included)
    pub predict_calls: AtomicUsize,

    /// Release order log: "predictor:<device>" / "model:<device>" entries
    pub release_log: Mutex<Vec<String>>,
}

/// Deterministic in-process engine.
pub struct StubEngine {
    devices: Vec<Device>,
    fail_load_on: Option<usize>,
    fail_predict_on: Option<usize>,
    counters: Arc<StubCounters>,
}

impl StubEngine {
    /// Engine exposing `device_count` CPU devices.
    pub fn new(device_count: usize) -> Self {
        Self::with_devices((0..device_count).map(Device::Cpu).collect())
    }

    /// Engine exposing an explicit device list.
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices,
            fail_load_on: None,
            fail_predict_on: None,
            counters: Arc::new(StubCounters::default()),
        }
    }

    /// Script predictor construction to fail on the device at the given
    /// enumeration index.
    pub fn fail_load_on_device(mut self, index: usize) -> Self {
        self.fail_load_on = Some(index);
        self
    }

    /// Script inference calls to fail on the device at the given enumeration
    /// index.
    pub fn fail_predict_on_device(mut self, index: usize) -> Self {
        self.fail_predict_on = Some(index);
        self
    }

    /// Handle accounting shared with every handle this engine creates.
    pub fn counters(&self) -> Arc<StubCounters> {
        Arc::clone(&self.counters)
    }
}

impl NativeEngine for StubEngine {
    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn load_model(
        &self,
        spec: &LoadSpec<'_>,
        device: Device,
    ) -> std::result::Result<Box<dyn NativeModel>, EngineError> {
        if spec.kind.requires_model_file() {
            let model_file = spec
                .model_file
                .ok_or_else(|| EngineError::from("no model file in load spec"))?;
            // Touch the graph so a missing or unreadable file fails here,
            // like a real runtime would.
            std::fs::metadata(model_file)
                .map_err(|e| EngineError::from(format!("cannot read model file: {}", e)))?;
        }

        let index = self.devices.iter().position(|d| *d == device);

        self.counters.models_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubModel {
            device,
            fail_predictor: index.is_some() && index == self.fail_load_on,
            fail_predict: index.is_some() && index == self.fail_predict_on,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct StubModel {
    device: Device,
    fail_predictor: bool,
    fail_predict: bool,
    counters: Arc<StubCounters>,
}

impl NativeModel for StubModel {
    fn new_predictor(&self) -> std::result::Result<Box<dyn Predictor>, EngineError> {
        if self.fail_predictor {
            return Err(format!("scripted predictor failure on {}", self.device).into());
        }
        self.counters.predictors_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubPredictor {
            device: self.device,
            fail_predict: self.fail_predict,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn device(&self) -> Device {
        self.device
    }
}

impl Drop for StubModel {
    fn drop(&mut self) {
        self.counters.models_open.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut log) = self.counters.release_log.lock() {
            log.push(format!("model:{}", self.device));
        }
    }
}

struct StubPredictor {
    device: Device,
    fail_predict: bool,
    counters: Arc<StubCounters>,
}

impl Predictor for StubPredictor {
    fn predict(&self, input: &[u8]) -> std::result::Result<Vec<u8>, EngineError> {
        self.counters.predict_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_predict {
            return Err(format!("scripted inference failure on {}", self.device).into());
        }
        let digest = hash::sha256_hex(input);
        Ok(format!("{}|{}", self.device, &digest[..16]).into_bytes())
    }

    fn device(&self) -> Device {
        self.device
    }
}

impl Drop for StubPredictor {
    fn drop(&mut self) {
        self.counters.predictors_open.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut log) = self.counters.release_log.lock() {
            log.push(format!("predictor:{}", self.device));
        }
    }
}
