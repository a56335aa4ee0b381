//! Engine implementations
//!
//! Production engines live outside this crate and are injected through the
//! [`crate::inference::InferenceEngine`] trait. The mock engine here exists
//! for tests and for exercising the orchestration layer without model files.

pub mod mock;

pub use mock::{MockEngine, MockEngineHandle, FAIL_PAYLOAD_MARKER};
