//! Pipeline configuration and validated updates.

use serde::{Deserialize, Serialize};

use crate::error::DenoiseError;

pub const DEFAULT_BUFFER_SIZE: usize = 2048;
pub const DEFAULT_OVERLAP: f32 = 0.5;

/// Analysis frames covered by the initial calibration window. With the
/// default 2048-sample buffer at 50% overlap and 48 kHz this is roughly the
/// first half second of input.
pub const DEFAULT_CALIBRATION_FRAMES: usize = 24;

pub const MIN_BUFFER_SIZE: usize = 64;
pub const MAX_BUFFER_SIZE: usize = 16384;

/// Shape of the frame taper. The taper's edge ramps double as the
/// overlap-add crossfade curves, so the two kinds trade spectral leakage
/// against ramp steepness, not reconstruction accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Raised-cosine ramps. At 50% overlap this is the periodic Hann window.
    #[default]
    Hann,
    /// Linear ramps.
    Linear,
}

/// Validated pipeline configuration.
///
/// Constructed with [`DenoiseConfig::default`] and adjusted through
/// [`ConfigUpdate`]; every entry point validates before anything is applied,
/// so an invalid value can never become visible to a frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Gate aggressiveness in [0, 1]. Zero leaves the spectrum untouched.
    pub noise_reduction: f32,
    /// Analysis frame length in samples. Positive power of two.
    pub buffer_size: usize,
    /// Fraction of each frame shared with its successor, in [0, 1).
    pub overlap: f32,
    pub window: WindowKind,
    /// Leading frames during which the noise profile converges at the
    /// maximal rate from its zero-initialized state.
    pub calibration_frames: usize,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            noise_reduction: 0.5,
            buffer_size: DEFAULT_BUFFER_SIZE,
            overlap: DEFAULT_OVERLAP,
            window: WindowKind::Hann,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
        }
    }
}

impl DenoiseConfig {
    pub fn validate(&self) -> Result<(), DenoiseError> {
        if !(0.0..=1.0).contains(&self.noise_reduction) || !self.noise_reduction.is_finite() {
            return Err(DenoiseError::Config {
                reason: format!(
                    "noise_reduction {} out of range [0, 1]",
                    self.noise_reduction
                ),
            });
        }
        if !self.buffer_size.is_power_of_two()
            || self.buffer_size < MIN_BUFFER_SIZE
            || self.buffer_size > MAX_BUFFER_SIZE
        {
            return Err(DenoiseError::Config {
                reason: format!(
                    "buffer_size {} must be a power of two between {} and {}",
                    self.buffer_size, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE
                ),
            });
        }
        if !(0.0..1.0).contains(&self.overlap) || !self.overlap.is_finite() {
            return Err(DenoiseError::Config {
                reason: format!("overlap {} out of range [0, 1)", self.overlap),
            });
        }
        if self.hop_size() == 0 {
            return Err(DenoiseError::Config {
                reason: format!(
                    "overlap {} leaves no hop for buffer_size {}",
                    self.overlap, self.buffer_size
                ),
            });
        }
        Ok(())
    }

    /// Samples shared between consecutive frames.
    pub fn overlap_len(&self) -> usize {
        (self.buffer_size as f32 * self.overlap).round() as usize
    }

    /// Samples advanced between consecutive frames.
    pub fn hop_size(&self) -> usize {
        self.buffer_size - self.overlap_len()
    }

    /// Frequency bins produced by the forward transform.
    pub fn num_bins(&self) -> usize {
        self.buffer_size / 2 + 1
    }
}

/// Partial configuration update. Unset fields keep their current value.
/// The merged result is validated as a whole before it is staged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub noise_reduction: Option<f32>,
    pub buffer_size: Option<usize>,
    pub overlap: Option<f32>,
    pub window: Option<WindowKind>,
    pub calibration_frames: Option<usize>,
}

impl ConfigUpdate {
    pub fn apply_to(&self, base: &DenoiseConfig) -> DenoiseConfig {
        DenoiseConfig {
            noise_reduction: self.noise_reduction.unwrap_or(base.noise_reduction),
            buffer_size: self.buffer_size.unwrap_or(base.buffer_size),
            overlap: self.overlap.unwrap_or(base.overlap),
            window: self.window.unwrap_or(base.window),
            calibration_frames: self.calibration_frames.unwrap_or(base.calibration_frames),
        }
    }
}
