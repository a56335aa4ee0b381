//! Inference engine boundary contract
//!
//! The engine (model weights, tensor execution, image I/O) is an external
//! collaborator behind this narrow trait. The orchestrator never assumes
//! anything about how the engine runs a model, only that it can load exactly
//! one model at a time and run it over one payload per call.

use crate::models::ModelId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for engine boundary calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by the inference engine.
///
/// The fallback recommendation is a structured signal rather than a
/// substring in an error message, so callers can pattern-match the recovery
/// decision instead of parsing prose.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine declined to load the requested model and recommends
    /// reverting to the broadly compatible default. Expected on devices
    /// whose capability probe was optimistic; recovered silently.
    #[error("engine declined '{model}': {reason}")]
    FallbackRecommended {
        /// Model the engine declined
        model: ModelId,
        /// Engine-reported reason, for logging only
        reason: String,
    },

    /// The engine could not load the model at all
    #[error("model initialization failed: {0}")]
    Initialization(String),

    /// A single inference run failed
    #[error("inference failed: {0}")]
    Inference(String),
}

impl EngineError {
    /// Create an initialization error
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization(msg.into())
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }
}

/// Read-only capability snapshot reported by the engine.
///
/// Independent of whichever model is currently loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Whether the engine can use WebGPU acceleration
    pub webgpu_supported: bool,
    /// Whether the engine is running on an iOS device
    pub is_ios: bool,
}

/// Boundary contract with the external inference engine.
///
/// Implementations are not required to be safe under concurrent calls; the
/// orchestrator serializes every call through an exclusive lock, so at most
/// one `initialize_model` or `process_image` is outstanding at any time.
#[async_trait]
pub trait InferenceEngine: Send {
    /// Load the named model, replacing whatever was loaded before.
    ///
    /// # Errors
    /// - [`EngineError::FallbackRecommended`] when the engine declines the
    ///   model and a silent revert to the default is the expected recovery
    /// - [`EngineError::Initialization`] when loading fails outright
    async fn initialize_model(&mut self, model: ModelId) -> EngineResult<()>;

    /// Run the currently loaded model over one image payload.
    ///
    /// Returns one output payload for the input. Each call carries exactly
    /// one file so a failed call maps to exactly one failed job.
    ///
    /// # Errors
    /// - [`EngineError::Inference`] when no model is loaded or the run fails
    async fn process_image(&mut self, file: &[u8]) -> EngineResult<Vec<u8>>;

    /// Capability snapshot, independent of the active model.
    ///
    /// The orchestrator answers capability queries from the
    /// [`crate::capability::DeviceProfile`] detected at startup; it reads
    /// this snapshot once during session startup only to log a
    /// disagreement between the two probes. Hosts that need the engine's
    /// own view may call it directly.
    fn engine_info(&self) -> EngineInfo;
}

/// Exclusive handle to the engine shared between the lifecycle manager and
/// the processing queue. The mutex is the resource rule of the design: the
/// engine holds exclusive hardware state, so calls must never overlap.
pub type SharedEngine = Arc<tokio::sync::Mutex<Box<dyn InferenceEngine>>>;

/// Wrap an engine into the shared exclusive handle
#[must_use]
pub fn share_engine(engine: Box<dyn InferenceEngine>) -> SharedEngine {
    Arc::new(tokio::sync::Mutex::new(engine))
}
