//! Mock engine implementation for testing and debugging
//!
//! Scriptable stand-in for a real inference engine: individual models can be
//! made to fail or be declined, individual payloads can be made to fail
//! inference, and every call is recorded for later inspection through a
//! [`MockEngineHandle`].

use crate::inference::{EngineError, EngineInfo, EngineResult, InferenceEngine};
use crate::models::ModelId;
use async_trait::async_trait;
use instant::Duration;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Payloads starting with this marker fail inference with an
/// [`EngineError::Inference`], which lets tests engineer per-job failures
/// inside an otherwise healthy batch.
pub const FAIL_PAYLOAD_MARKER: &[u8] = b"__fail__";

/// Prefix the mock prepends to every successfully processed payload
const PROCESSED_PREFIX: &[u8] = b"processed:";

#[derive(Debug, Default)]
struct MockCalls {
    init_calls: Vec<ModelId>,
    inference_calls: usize,
    loaded: Option<ModelId>,
}

/// Inspection handle into a [`MockEngine`], usable after the engine itself
/// has been moved into a session
#[derive(Debug, Clone)]
pub struct MockEngineHandle {
    calls: Arc<Mutex<MockCalls>>,
}

impl MockEngineHandle {
    /// Every model the engine was asked to load, in call order
    #[must_use]
    pub fn init_calls(&self) -> Vec<ModelId> {
        self.calls.lock().unwrap().init_calls.clone()
    }

    /// Number of inference calls made so far
    #[must_use]
    pub fn inference_calls(&self) -> usize {
        self.calls.lock().unwrap().inference_calls
    }

    /// The model currently loaded, if any
    #[must_use]
    pub fn loaded(&self) -> Option<ModelId> {
        self.calls.lock().unwrap().loaded
    }
}

/// Scriptable mock engine
#[derive(Debug)]
pub struct MockEngine {
    info: EngineInfo,
    hard_fail: HashSet<ModelId>,
    fail_once: HashSet<ModelId>,
    declined: HashSet<ModelId>,
    latency: Option<Duration>,
    calls: Arc<Mutex<MockCalls>>,
}

impl MockEngine {
    /// Create a mock engine reporting a WebGPU-capable desktop device
    #[must_use]
    pub fn new() -> Self {
        Self::with_info(EngineInfo {
            webgpu_supported: true,
            is_ios: false,
        })
    }

    /// Create a mock engine reporting the given capability snapshot
    #[must_use]
    pub fn with_info(info: EngineInfo) -> Self {
        Self {
            info,
            hard_fail: HashSet::new(),
            fail_once: HashSet::new(),
            declined: HashSet::new(),
            latency: None,
            calls: Arc::new(Mutex::new(MockCalls::default())),
        }
    }

    /// Every load of `model` fails with [`EngineError::Initialization`]
    #[must_use]
    pub fn failing_init(mut self, model: ModelId) -> Self {
        self.hard_fail.insert(model);
        self
    }

    /// The first load of `model` fails; later loads succeed (retry testing)
    #[must_use]
    pub fn failing_init_once(mut self, model: ModelId) -> Self {
        self.fail_once.insert(model);
        self
    }

    /// Loads of `model` are declined with [`EngineError::FallbackRecommended`]
    #[must_use]
    pub fn declining(mut self, model: ModelId) -> Self {
        self.declined.insert(model);
        self
    }

    /// Every inference call sleeps for `latency` before completing
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Obtain an inspection handle that stays valid after the engine is
    /// moved into a session
    #[must_use]
    pub fn handle(&self) -> MockEngineHandle {
        MockEngineHandle {
            calls: Arc::clone(&self.calls),
        }
    }

    /// Expected mock output for a given input payload
    #[must_use]
    pub fn processed_payload(input: &[u8]) -> Vec<u8> {
        let mut out = PROCESSED_PREFIX.to_vec();
        out.extend_from_slice(input);
        out
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn initialize_model(&mut self, model: ModelId) -> EngineResult<()> {
        self.calls.lock().unwrap().init_calls.push(model);

        if self.fail_once.remove(&model) {
            return Err(EngineError::initialization(format!(
                "transient failure loading '{model}'"
            )));
        }
        if self.hard_fail.contains(&model) {
            return Err(EngineError::initialization(format!(
                "cannot load '{model}'"
            )));
        }
        if self.declined.contains(&model) {
            return Err(EngineError::FallbackRecommended {
                model,
                reason: "no usable adapter for this variant".to_string(),
            });
        }

        self.calls.lock().unwrap().loaded = Some(model);
        Ok(())
    }

    async fn process_image(&mut self, file: &[u8]) -> EngineResult<Vec<u8>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let loaded = self.calls.lock().unwrap().loaded;
        if loaded.is_none() {
            return Err(EngineError::inference("no model loaded"));
        }

        self.calls.lock().unwrap().inference_calls += 1;

        if file.starts_with(FAIL_PAYLOAD_MARKER) {
            return Err(EngineError::inference("segmentation produced no mask"));
        }
        Ok(Self::processed_payload(file))
    }

    fn engine_info(&self) -> EngineInfo {
        self.info
    }
}
