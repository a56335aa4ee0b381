//! Session startup and top-level orchestration
//!
//! A [`Session`] wires capability detection, the model lifecycle manager and
//! the processing queue into the two-phase startup sequence: classify the
//! environment once, short-circuit to the redirect hand-off when the device
//! cannot host the engine, otherwise load the capability default model and
//! open the queue for submissions.

use crate::capability::{self, DeviceProfile, EnvironmentSignals, REDIRECT_URL};
use crate::error::{OrchestratorError, Result};
use crate::inference::{share_engine, EngineInfo, InferenceEngine};
use crate::lifecycle::{ModelLifecycleManager, ModelState};
use crate::models::{self, ModelId};
use crate::queue::{ImageJob, ImageProcessingQueue, JobId, JobUpdate};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Result of the startup sequence
pub enum StartupOutcome {
    /// The device can host the engine; the session is live and accepting
    /// job submissions
    Ready(Session),
    /// The device cannot host the engine; navigation must be handed off to
    /// the contained URL and no further local processing happens this
    /// session
    Redirect(&'static str),
}

/// Live background-removal session
pub struct Session {
    profile: DeviceProfile,
    lifecycle: ModelLifecycleManager,
    queue: ImageProcessingQueue,
}

impl Session {
    /// Run the startup sequence: detect capabilities, then initialize the
    /// default model and open the queue.
    ///
    /// Detection runs exactly once; its result is cached on the session.
    /// When the profile demands a redirect the engine is never touched and
    /// [`StartupOutcome::Redirect`] is returned.
    ///
    /// # Errors
    /// [`OrchestratorError::Initialization`] when the startup model load
    /// fails. This is fatal for the session: no processing is possible and
    /// recovery means starting a fresh session.
    pub async fn start(
        engine: Box<dyn InferenceEngine>,
        signals: &EnvironmentSignals,
    ) -> Result<StartupOutcome> {
        let profile = capability::detect(signals);

        if profile.should_redirect {
            info!(url = REDIRECT_URL, "device cannot host the engine, handing off");
            return Ok(StartupOutcome::Redirect(REDIRECT_URL));
        }

        let engine = share_engine(engine);
        let snapshot = engine.lock().await.engine_info();
        if snapshot.webgpu_supported != profile.webgpu_supported || snapshot.is_ios != profile.is_ios
        {
            // The profile stays authoritative; the disagreement is only logged.
            debug!(?snapshot, ?profile, "engine capability snapshot disagrees with detected profile");
        }

        let mut lifecycle = ModelLifecycleManager::new(engine.clone(), profile);
        if !lifecycle.initialize(None).await {
            return Err(OrchestratorError::initialization(
                "startup model load failed",
            ));
        }

        let queue = ImageProcessingQueue::spawn(engine, lifecycle.subscribe());
        info!("session ready");
        Ok(StartupOutcome::Ready(Self {
            profile,
            lifecycle,
            queue,
        }))
    }

    /// Submit image payloads for processing; returns the assigned job ids
    pub fn submit(&self, files: Vec<Vec<u8>>) -> Vec<JobId> {
        self.queue.submit(files)
    }

    /// Remove a job from the visible set; idempotent, any status
    pub fn delete_job(&self, id: JobId) {
        self.queue.delete(id)
    }

    /// Snapshot of the visible job set, in submission order
    #[must_use]
    pub fn jobs(&self) -> Vec<ImageJob> {
        self.queue.jobs()
    }

    /// Take the job status-update receiver (yields `Some` exactly once)
    pub fn take_job_updates(&mut self) -> Option<mpsc::UnboundedReceiver<JobUpdate>> {
        self.queue.take_updates()
    }

    /// Switch the active model. Soft declines are recovered silently by
    /// reverting to the default model; hard failures keep the previous model
    /// effective and surface an error with an explicit recovery action.
    ///
    /// # Errors
    /// See [`ModelLifecycleManager::switch_model`].
    pub async fn switch_model(&mut self, model: ModelId) -> Result<()> {
        self.lifecycle.switch_model(model).await
    }

    /// User-triggered retry after a post-startup `Failed` state. Returns
    /// `true` when a model is loaded and the session is ready again.
    pub async fn retry_initialize(&mut self, model: Option<ModelId>) -> bool {
        self.lifecycle.initialize(model).await
    }

    /// Current model state snapshot
    #[must_use]
    pub fn model_state(&self) -> ModelState {
        self.lifecycle.state()
    }

    /// Subscribe to model state transitions
    #[must_use]
    pub fn model_state_updates(&self) -> watch::Receiver<ModelState> {
        self.lifecycle.subscribe()
    }

    /// The capability profile detected at startup
    #[must_use]
    pub fn device_profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Capability info accessor for the presentation layer; reflects the
    /// device profile, not the active model
    #[must_use]
    pub fn engine_info(&self) -> EngineInfo {
        self.lifecycle.info()
    }

    /// The models the presentation layer may offer on this device
    #[must_use]
    pub fn eligible_models(&self) -> Vec<ModelId> {
        models::eligible_models(&self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockEngine;
    use crate::lifecycle::ModelStatus;

    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const MOBILE_FIREFOX_UA: &str =
        "Mozilla/5.0 (Android 14; Mobile; rv:127.0) Gecko/127.0 Firefox/127.0";

    async fn live_session(engine: MockEngine, signals: &EnvironmentSignals) -> Session {
        match Session::start(Box::new(engine), signals).await.unwrap() {
            StartupOutcome::Ready(session) => session,
            StartupOutcome::Redirect(_) => panic!("unexpected redirect"),
        }
    }

    #[tokio::test]
    async fn test_startup_reaches_ready_with_default_model() {
        let signals = EnvironmentSignals::new(DESKTOP_UA, true);
        let session = live_session(MockEngine::new(), &signals).await;

        let state = session.model_state();
        assert_eq!(state.status, ModelStatus::Ready);
        assert_eq!(state.active_model, Some(ModelId::IsnetQuantized));
        assert!(session.device_profile().webgpu_supported);
    }

    #[tokio::test]
    async fn test_startup_on_ios_selects_mobile_model() {
        for webgpu in [false, true] {
            let signals = EnvironmentSignals::new(IPHONE_UA, webgpu);
            let session = live_session(MockEngine::new(), &signals).await;
            assert_eq!(
                session.model_state().active_model,
                Some(ModelId::IsnetMobileOptimized)
            );
        }
    }

    #[tokio::test]
    async fn test_redirect_short_circuits_before_any_engine_call() {
        let engine = MockEngine::new();
        let handle = engine.handle();
        let signals = EnvironmentSignals::new(MOBILE_FIREFOX_UA, false);

        match Session::start(Box::new(engine), &signals).await.unwrap() {
            StartupOutcome::Redirect(url) => assert_eq!(url, REDIRECT_URL),
            StartupOutcome::Ready(_) => panic!("expected redirect"),
        }
        assert!(handle.init_calls().is_empty());
        assert_eq!(handle.inference_calls(), 0);
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let engine = MockEngine::new().failing_init(ModelId::IsnetQuantized);
        let signals = EnvironmentSignals::new(DESKTOP_UA, false);

        let err = Session::start(Box::new(engine), &signals)
            .await
            .err()
            .expect("startup must fail");
        assert!(matches!(err, OrchestratorError::Initialization(_)));
        assert_eq!(err.recovery(), crate::error::Recovery::Fatal);
    }

    #[tokio::test]
    async fn test_eligible_models_follow_profile() {
        let signals = EnvironmentSignals::new(DESKTOP_UA, false);
        let session = live_session(MockEngine::new(), &signals).await;
        assert!(!session.eligible_models().contains(&ModelId::IsnetFp16));

        let signals = EnvironmentSignals::new(DESKTOP_UA, true);
        let session = live_session(MockEngine::new(), &signals).await;
        assert!(session.eligible_models().contains(&ModelId::IsnetFp16));
    }

    #[tokio::test]
    async fn test_engine_info_reflects_profile_not_engine_snapshot() {
        // The engine's own probe disagrees with the environment signals;
        // the detected profile stays authoritative for the accessor.
        let engine = MockEngine::with_info(EngineInfo {
            webgpu_supported: false,
            is_ios: true,
        });
        let signals = EnvironmentSignals::new(DESKTOP_UA, true);
        let session = live_session(engine, &signals).await;

        let info = session.engine_info();
        assert!(info.webgpu_supported);
        assert!(!info.is_ios);
    }

    #[tokio::test]
    async fn test_engine_info_reflects_profile_not_model() {
        let signals = EnvironmentSignals::new(IPHONE_UA, false);
        let mut session = live_session(MockEngine::new(), &signals).await;

        let info_before = session.engine_info();
        session
            .switch_model(ModelId::IsnetQuantized)
            .await
            .unwrap();
        assert_eq!(session.engine_info(), info_before);
        assert!(info_before.is_ios);
    }
}
