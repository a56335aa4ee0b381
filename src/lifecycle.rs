//! Model lifecycle management
//!
//! Owns the singleton [`ModelState`]: which model is active and whether the
//! engine is ready for job submission. All transitions are published over a
//! watch channel so the processing queue and the presentation layer observe
//! the same state without sharing mutable fields.
//!
//! The state machine:
//!
//! ```text
//! Uninitialized --initialize--> Initializing --success--> Ready
//!                                            --failure--> Failed (retriable)
//! Ready --switch_model--> Switching --success--------------> Ready(new)
//!                                   --fallback recommended-> Ready(default)
//!                                   --hard failure---------> Ready(previous), error surfaced
//! ```
//!
//! Methods take `&mut self`, so at most one initialization or switch is ever
//! in flight; a re-entrant call cannot exist and a sequential call in a bad
//! state is rejected before the engine is touched.

use crate::capability::DeviceProfile;
use crate::error::{OrchestratorError, Result};
use crate::inference::{EngineError, EngineInfo, SharedEngine};
use crate::models::ModelId;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Readiness of the active model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// No model load has been attempted yet
    Uninitialized,
    /// The startup (or retried) model load is in flight
    Initializing,
    /// A model is loaded and jobs may be processed
    Ready,
    /// A user-requested model change is in flight; job processing is paused
    Switching,
    /// The last load attempt failed; user-retriable
    Failed,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Switching => "switching",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Singleton model state: the active model identifier and its readiness.
///
/// `active_model` is `Some` exactly when a load has succeeded at some point;
/// there is never a moment with two concurrently active models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelState {
    /// The model currently effective for job submission, if any
    pub active_model: Option<ModelId>,
    /// Readiness of that model
    pub status: ModelStatus,
}

impl ModelState {
    const UNINITIALIZED: Self = Self {
        active_model: None,
        status: ModelStatus::Uninitialized,
    };
}

/// Owns the active model and sequences loads and switches against the engine
pub struct ModelLifecycleManager {
    engine: SharedEngine,
    profile: DeviceProfile,
    state_tx: watch::Sender<ModelState>,
}

impl ModelLifecycleManager {
    /// Create a manager in the `Uninitialized` state
    #[must_use]
    pub fn new(engine: SharedEngine, profile: DeviceProfile) -> Self {
        let (state_tx, _) = watch::channel(ModelState::UNINITIALIZED);
        Self {
            engine,
            profile,
            state_tx,
        }
    }

    /// Current model state snapshot
    #[must_use]
    pub fn state(&self) -> ModelState {
        *self.state_tx.borrow()
    }

    /// Subscribe to model state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state_tx.subscribe()
    }

    /// Capability info for the presentation layer.
    ///
    /// Reflects the device profile, not the active model.
    #[must_use]
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            webgpu_supported: self.profile.webgpu_supported,
            is_ios: self.profile.is_ios,
        }
    }

    /// Load a model, choosing the capability default when none is given.
    ///
    /// Legal from `Uninitialized` and from `Failed` (user retry); any other
    /// status rejects the call without touching the engine. Returns `true`
    /// when the model is loaded and `Ready`; `false` on rejection or engine
    /// failure, leaving the status `Failed` in the latter case. This path
    /// reports failure through the return value only and always terminates
    /// in `Ready` or `Failed`, never `Initializing`.
    pub async fn initialize(&mut self, model: Option<ModelId>) -> bool {
        let current = self.state();
        match current.status {
            ModelStatus::Uninitialized | ModelStatus::Failed => {},
            status => {
                warn!(%status, "initialize rejected in current status");
                return false;
            },
        }

        let model = model.unwrap_or_else(|| ModelId::default_for(&self.profile));
        self.set_state(ModelState {
            active_model: current.active_model,
            status: ModelStatus::Initializing,
        });
        info!(model = %model, "initializing model");

        match self.engine.lock().await.initialize_model(model).await {
            Ok(()) => {
                info!(model = %model, "model ready");
                self.set_state(ModelState {
                    active_model: Some(model),
                    status: ModelStatus::Ready,
                });
                true
            },
            Err(error) => {
                warn!(model = %model, %error, "model initialization failed");
                self.set_state(ModelState {
                    active_model: current.active_model,
                    status: ModelStatus::Failed,
                });
                false
            },
        }
    }

    /// Switch to a different model.
    ///
    /// Only legal while `Ready`. Job processing is paused for the duration
    /// of the switch and exactly one model is effective at the end of every
    /// branch:
    ///
    /// - success: the new model is active and `Ready`;
    /// - engine recommends fallback: the broadly compatible default is
    ///   loaded instead, silently ([`Ok`] is returned, no user-visible
    ///   error);
    /// - hard failure: the previously active model remains effective and a
    ///   [`OrchestratorError::SwitchFailed`] is returned for the caller to
    ///   surface with its recovery action.
    ///
    /// # Errors
    /// - [`OrchestratorError::NotReady`] when called outside `Ready`
    /// - [`OrchestratorError::SwitchFailed`] on a hard engine failure, or
    ///   when the silent fallback load itself fails (status is then
    ///   `Failed` and no working model remains)
    pub async fn switch_model(&mut self, new_model: ModelId) -> Result<()> {
        let current = self.state();
        if current.status != ModelStatus::Ready {
            return Err(OrchestratorError::NotReady {
                status: current.status,
            });
        }
        let previous = current.active_model;

        self.set_state(ModelState {
            active_model: previous,
            status: ModelStatus::Switching,
        });
        info!(model = %new_model, "switching model");

        let attempt = self.engine.lock().await.initialize_model(new_model).await;
        match attempt {
            Ok(()) => {
                info!(model = %new_model, "switch complete");
                self.set_state(ModelState {
                    active_model: Some(new_model),
                    status: ModelStatus::Ready,
                });
                Ok(())
            },
            Err(EngineError::FallbackRecommended { model, reason }) => {
                debug!(%model, %reason, "engine declined model, reverting to default");
                self.fall_back_to_default(new_model).await
            },
            Err(error) => {
                warn!(model = %new_model, %error, "switch failed, keeping previous model");
                self.set_state(ModelState {
                    active_model: previous,
                    status: ModelStatus::Ready,
                });
                Err(OrchestratorError::SwitchFailed {
                    attempted: new_model,
                    reason: error.to_string(),
                })
            },
        }
    }

    /// Silent-fallback leg of a switch: load the broadly compatible default
    /// in place of the declined model. Not surfaced as an error on success.
    async fn fall_back_to_default(&mut self, attempted: ModelId) -> Result<()> {
        let default = ModelId::DEFAULT;
        match self.engine.lock().await.initialize_model(default).await {
            Ok(()) => {
                info!(model = %default, "reverted to default model");
                self.set_state(ModelState {
                    active_model: Some(default),
                    status: ModelStatus::Ready,
                });
                Ok(())
            },
            Err(error) => {
                // No working model remains; this is no longer a soft case.
                warn!(%error, "fallback to default model failed");
                self.set_state(ModelState {
                    active_model: None,
                    status: ModelStatus::Failed,
                });
                Err(OrchestratorError::SwitchFailed {
                    attempted,
                    reason: format!("fallback to '{default}' failed: {error}"),
                })
            },
        }
    }

    fn set_state(&self, state: ModelState) {
        // Receivers may all be gone (e.g. queue shut down); that is fine.
        let _ = self.state_tx.send(state);
    }
}
