#![allow(clippy::uninlined_format_args)]

//! # Background Removal Orchestrator
//!
//! Orchestration layer for on-device background removal. Everything runs
//! locally: nothing is uploaded, and the neural inference engine itself is
//! an external collaborator consumed through the narrow
//! [`InferenceEngine`] trait.
//!
//! The layer decides which model variant a device can run, manages the
//! lifecycle of loading and switching that model, and sequences per-image
//! inference jobs while isolating per-job failures from the rest of the
//! batch.
//!
//! ## Components
//!
//! - [`capability`]: classifies the runtime environment once at startup
//!   into a [`DeviceProfile`] (WebGPU support, iOS path, redirect hand-off).
//! - [`lifecycle`]: the [`ModelLifecycleManager`] state machine over the
//!   active model (`Uninitialized → Initializing → Ready ⇄ Switching`, with
//!   retriable `Failed`).
//! - [`queue`]: the [`ImageProcessingQueue`], which processes submitted
//!   images strictly one at a time in submission order and republishes
//!   every status transition as a [`JobUpdate`] message.
//! - [`error`]: the failure taxonomy and its [`Recovery`] classification
//!   (fatal, surfaced with a recovery action, or isolated to one job).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_orchestrator::{
//!     start_session, EnvironmentSignals, InferenceEngine, StartupOutcome,
//! };
//!
//! # async fn example(engine: Box<dyn InferenceEngine>) -> bgremove_orchestrator::Result<()> {
//! let signals = EnvironmentSignals::new(
//!     "Mozilla/5.0 (X11; Linux x86_64) Chrome/126.0".to_string(),
//!     true, // WebGPU adapter available
//! );
//!
//! match start_session(engine, &signals).await? {
//!     StartupOutcome::Redirect(url) => {
//!         // Device cannot run the engine; hand navigation off
//!         println!("redirecting to {url}");
//!     },
//!     StartupOutcome::Ready(mut session) => {
//!         let mut updates = session.take_job_updates().unwrap();
//!         let payload: Vec<u8> = std::fs::read("input.jpg").expect("readable input");
//!         let ids = session.submit(vec![payload]);
//!         while let Some(update) = updates.recv().await {
//!             if update.id == ids[0] && update.status.is_terminal() {
//!                 break;
//!             }
//!         }
//!     },
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! The engine holds exclusive hardware state (a GPU/CPU tensor context), so
//! at most one engine call (model load or inference) is outstanding at any
//! time; an exclusive async lock enforces this. The queue is a single
//! worker task, which makes submission order the completion order, and a
//! model switch pauses the queue without draining it.

pub mod backends;
pub mod capability;
pub mod error;
pub mod inference;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod session;

// Public API exports
pub use backends::{MockEngine, MockEngineHandle};
pub use capability::{detect, DeviceProfile, EnvironmentSignals, REDIRECT_URL};
pub use error::{OrchestratorError, Recovery, Result};
pub use inference::{share_engine, EngineError, EngineInfo, InferenceEngine, SharedEngine};
pub use lifecycle::{ModelLifecycleManager, ModelState, ModelStatus};
pub use models::{eligible_models, ModelId};
pub use queue::{ImageJob, ImageProcessingQueue, JobId, JobStatus, JobUpdate};
pub use session::{Session, StartupOutcome};

/// Run the full startup sequence and hand back a live session or the
/// redirect target.
///
/// Convenience wrapper over [`Session::start`]: detects device capabilities
/// once, short-circuits to [`StartupOutcome::Redirect`] for devices that
/// cannot host the engine, and otherwise loads the capability-default model
/// before opening the queue.
///
/// # Errors
/// [`OrchestratorError::Initialization`] when the startup model load fails;
/// fatal for the session.
pub async fn start_session(
    engine: Box<dyn InferenceEngine>,
    signals: &EnvironmentSignals,
) -> Result<StartupOutcome> {
    Session::start(engine, signals).await
}
