//! Error types and recovery classification for orchestration failures

use crate::inference::EngineError;
use crate::lifecycle::ModelStatus;
use crate::models::ModelId;
use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failures surfaced by the orchestration layer.
///
/// Per-image processing failures never appear here: they are isolated to the
/// owning job's terminal `Failed` status and only logged. Soft fallbacks are
/// recovered inside the lifecycle manager and never surface at all.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Startup model initialization failed; fatal for the session
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A model switch failed hard; the previously active model is still the
    /// effective model and an explicit revert-to-default action applies
    #[error("switch to '{attempted}' failed: {reason}")]
    SwitchFailed {
        /// Model the switch attempted to load
        attempted: ModelId,
        /// Underlying engine-reported reason
        reason: String,
    },

    /// Operation requires the lifecycle to be in the `Ready` state
    #[error("model is not ready (current status: {status})")]
    NotReady {
        /// Status at the time of the call
        status: ModelStatus,
    },

    /// Pass-through engine failure
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl OrchestratorError {
    /// Create a new initialization error
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization(msg.into())
    }

    /// Classify this error under the recovery policy
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Initialization(_) => Recovery::Fatal,
            Self::SwitchFailed { .. } | Self::NotReady { .. } => Recovery::Surfaced,
            Self::Engine(engine) => match engine {
                EngineError::Initialization(_) => Recovery::Fatal,
                // Recovered inside switch_model; surfaced only if it escapes
                EngineError::FallbackRecommended { .. } => Recovery::Surfaced,
                EngineError::Inference(_) => Recovery::Isolated,
            },
        }
    }
}

/// How a failure is handled and presented.
///
/// One consistent classification applied wherever a failure originates,
/// rather than a separate runtime object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Session-blocking; no processing until the session is restarted
    Fatal,
    /// Blocking error with an explicit user recovery action (e.g. revert to
    /// the broadly compatible model)
    Surfaced,
    /// Visible only in the owning job's terminal status; never interrupts
    /// the session or other jobs
    Isolated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classification() {
        assert_eq!(
            OrchestratorError::initialization("no engine").recovery(),
            Recovery::Fatal
        );
        assert_eq!(
            OrchestratorError::SwitchFailed {
                attempted: ModelId::IsnetFp16,
                reason: "device lost".to_string(),
            }
            .recovery(),
            Recovery::Surfaced
        );
        assert_eq!(
            OrchestratorError::Engine(EngineError::inference("tensor shape")).recovery(),
            Recovery::Isolated
        );
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::SwitchFailed {
            attempted: ModelId::IsnetFp16,
            reason: "device lost".to_string(),
        };
        assert_eq!(err.to_string(), "switch to 'isnet-fp16' failed: device lost");

        let err = OrchestratorError::NotReady {
            status: ModelStatus::Switching,
        };
        assert!(err.to_string().contains("switching"));
    }
}
