//! Model identifiers and capability-based eligibility rules

use crate::capability::DeviceProfile;
use serde::{Deserialize, Serialize};

/// Closed set of model variants the orchestrator knows how to request.
///
/// The quantized model is the broadly compatible baseline that every
/// non-redirected device can run. The fp16 variant trades compatibility for
/// GPU throughput and is only eligible on WebGPU-capable devices. The mobile
/// variant is a separate inference path tuned for iOS devices and is selected
/// there regardless of the WebGPU probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelId {
    /// Quantized ISNet, the broadly compatible default
    IsnetQuantized,
    /// Half-precision ISNet, requires WebGPU acceleration
    IsnetFp16,
    /// Mobile-optimized ISNet used on iOS devices
    IsnetMobileOptimized,
}

impl ModelId {
    /// The broadly compatible model every eligible device can fall back to
    pub const DEFAULT: Self = Self::IsnetQuantized;

    /// All known model identifiers, in presentation order
    pub const ALL: [Self; 3] = [
        Self::IsnetQuantized,
        Self::IsnetFp16,
        Self::IsnetMobileOptimized,
    ];

    /// Select the startup model for a device profile.
    ///
    /// iOS devices force the mobile-optimized inference path independent of
    /// the WebGPU result. Everywhere else the quantized default is used;
    /// acceleration is an explicit user-driven switch, not an automatic
    /// upgrade.
    #[must_use]
    pub fn default_for(profile: &DeviceProfile) -> Self {
        if profile.is_ios {
            Self::IsnetMobileOptimized
        } else {
            Self::DEFAULT
        }
    }

    /// Whether this variant needs WebGPU to run at all
    #[must_use]
    pub fn requires_webgpu(self) -> bool {
        matches!(self, Self::IsnetFp16)
    }

    /// Whether the given device profile may select this model.
    ///
    /// An accelerated variant is only selectable when the profile reports
    /// WebGPU support; the baseline and mobile variants are always eligible.
    #[must_use]
    pub fn eligible_for(self, profile: &DeviceProfile) -> bool {
        !self.requires_webgpu() || profile.webgpu_supported
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IsnetQuantized => write!(f, "isnet-quantized"),
            Self::IsnetFp16 => write!(f, "isnet-fp16"),
            Self::IsnetMobileOptimized => write!(f, "isnet-mobile-optimized"),
        }
    }
}

/// List the models a presentation layer may offer for the given profile.
///
/// Models the profile cannot run are omitted entirely rather than shown
/// disabled, so an ineligible accelerated variant is never a selectable
/// option in the first place.
#[must_use]
pub fn eligible_models(profile: &DeviceProfile) -> Vec<ModelId> {
    ModelId::ALL
        .into_iter()
        .filter(|model| model.eligible_for(profile))
        .collect()
}
