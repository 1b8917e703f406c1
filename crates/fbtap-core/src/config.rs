use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Number of captures kept in the history ring by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Largest linear buffer kept per capture by default (3840×1080 at 4 bytes per pixel).
pub const DEFAULT_MAX_CAPTURE_SIZE: usize = 3840 * 1080 * 4;

/// Capture session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Slots in the capture history ring.
    #[serde(alias = "historyCapacity")]
    pub history_capacity: usize,
    /// Upper bound on one capture's linear buffer, in bytes.
    #[serde(alias = "maxCaptureSize")]
    pub max_capture_size: usize,
    /// Guess X tiling from pitch alignment when the modifier is unknown.
    #[serde(alias = "pitchHeuristic")]
    pub pitch_heuristic: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_capture_size: DEFAULT_MAX_CAPTURE_SIZE,
            pitch_heuristic: true,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_capture_size < 4 {
            return Err(ConfigError::CaptureSizeTooSmall { min: 4, got: self.max_capture_size });
        }
        Ok(())
    }

    /// Linear buffer size for a `width`×`height` capture, clamped to
    /// `max_capture_size`.
    pub fn linear_size(&self, width: u32, height: u32) -> usize {
        (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
            .min(self.max_capture_size)
    }
}
