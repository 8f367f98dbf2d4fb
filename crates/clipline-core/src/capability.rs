//! Hardware capability report (§3.1): consumed by the Environment Manager's
//! ASR/translation routing policy. Producing it from raw hardware probes is
//! out of scope (§1) — this is just the shape the policy consumes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilityReport {
    pub apple_silicon: bool,
    pub mps_available: bool,
    pub cuda_available: bool,
    pub cuda_device_count: u32,
    pub optimized_backend_available: bool,
}

impl HardwareCapabilityReport {
    /// Whether the MLX-optimized ASR path is usable, per the routing policy
    /// in §4.3 ("Apple-Silicon + MPS + optimized backend available ⇒ MLX").
    pub fn mlx_eligible(&self) -> bool {
        self.apple_silicon && self.mps_available && self.optimized_backend_available
    }
}
