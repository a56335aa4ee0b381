//! Device capability detection
//!
//! Classifies the runtime environment into an immutable [`DeviceProfile`]
//! exactly once per session, before any model load is attempted. Detection is
//! a pure function of the probe results handed in by the host shell; it never
//! touches the inference engine.

use serde::{Deserialize, Serialize};

/// Fixed hand-off target for browsers that cannot host the inference engine.
///
/// When [`DeviceProfile::should_redirect`] is true the session performs no
/// local processing at all and navigation is handed to this hosted service.
pub const REDIRECT_URL: &str = "https://hosted.bgremove.app/";

/// Raw environment probe results supplied by the host shell.
///
/// The host is responsible for reading the user agent string and probing for
/// a WebGPU adapter; this layer only classifies the answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSignals {
    /// Full user agent string of the hosting browser
    pub user_agent: String,
    /// Whether a WebGPU adapter could be acquired
    pub webgpu_adapter_available: bool,
}

impl EnvironmentSignals {
    /// Convenience constructor for tests and embedding hosts
    #[must_use]
    pub fn new(user_agent: impl Into<String>, webgpu_adapter_available: bool) -> Self {
        Self {
            user_agent: user_agent.into(),
            webgpu_adapter_available,
        }
    }
}

/// Immutable capability classification, computed once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Whether WebGPU-accelerated model variants are eligible
    pub webgpu_supported: bool,
    /// Whether the iOS-specific inference path must be used
    pub is_ios: bool,
    /// Whether the device cannot host the engine at all and must be handed
    /// off to [`REDIRECT_URL`] before any model load
    pub should_redirect: bool,
}

/// Classify the runtime environment into a [`DeviceProfile`].
///
/// Pure function of the signals: calling it twice with the same input yields
/// the same profile. [`crate::session::Session`] calls it exactly once and
/// caches the result for the session.
///
/// Mobile Firefox cannot host the engine in this product's support matrix,
/// so it is classified as a redirect. The redirect branch is terminal; the
/// iOS flag is only meaningful for non-redirected devices.
#[must_use]
pub fn detect(signals: &EnvironmentSignals) -> DeviceProfile {
    let ua = signals.user_agent.as_str();
    let should_redirect = is_mobile_firefox(ua);
    let is_ios = !should_redirect && is_ios_device(ua);

    DeviceProfile {
        webgpu_supported: signals.webgpu_adapter_available,
        is_ios,
        should_redirect,
    }
}

fn is_mobile_firefox(ua: &str) -> bool {
    ua.contains("Firefox") && (ua.contains("Mobile") || ua.contains("Android"))
}

fn is_ios_device(ua: &str) -> bool {
    ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod")
}
