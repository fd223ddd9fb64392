//! Adaptive per-bin noise floor estimation.
//!
//! Each channel keeps one smoothed magnitude per frequency bin. During the
//! calibration window the estimate converges at the maximal rate from zero;
//! afterwards it follows the input asymmetrically so stationary noise is
//! tracked while bursts of wanted signal barely move it.

/// Adaptation rate during the calibration window, both directions.
const ALPHA_CALIBRATION: f32 = 0.5;

/// Rate when the frame magnitude falls below the estimate. Faster than the
/// attack, so the floor cannot ride up on decaying signal tails, but not so
/// fast that the ordinary downward fluctuation of broadband noise drags the
/// estimate toward its minima instead of its mean.
const ALPHA_DECAY: f32 = 0.1;

/// Rate when the magnitude sits above the estimate but below the signal
/// guard. This is the normal upward tracking of drifting ambient noise.
const ALPHA_ATTACK: f32 = 0.08;

/// Rate when the magnitude exceeds `SIGNAL_GUARD` times the estimate. Such
/// bins are almost certainly carrying wanted signal, so the floor creeps
/// rather than climbs; a genuine loud shift in ambient noise still pulls the
/// estimate up over a few seconds.
const ALPHA_SIGNAL: f32 = 0.001;

const SIGNAL_GUARD: f32 = 2.0;

pub struct NoiseFloorEstimator {
    /// Smoothed magnitude per channel, per bin.
    floor: Vec<Vec<f32>>,
    /// Frames observed per channel since the last reset.
    frames_seen: Vec<u64>,
    calibration_frames: usize,
}

impl NoiseFloorEstimator {
    pub fn new(channels: usize, num_bins: usize, calibration_frames: usize) -> Self {
        Self {
            floor: vec![vec![0.0; num_bins]; channels],
            frames_seen: vec![0; channels],
            calibration_frames,
        }
    }

    /// Fold one frame's magnitude spectrum into the estimate. Never rejects
    /// input; magnitudes are expected non-negative and finite (the
    /// orchestrator sanitizes upstream).
    pub fn update(&mut self, channel: usize, magnitudes: &[f32]) {
        let calibrating = self.frames_seen[channel] < self.calibration_frames as u64;
        for (floor, &mag) in self.floor[channel].iter_mut().zip(magnitudes) {
            let alpha = if calibrating {
                ALPHA_CALIBRATION
            } else if mag < *floor {
                ALPHA_DECAY
            } else if mag < SIGNAL_GUARD * *floor {
                ALPHA_ATTACK
            } else {
                ALPHA_SIGNAL
            };
            *floor += alpha * (mag - *floor);
        }
        self.frames_seen[channel] += 1;
    }

    pub fn floor(&self, channel: usize) -> &[f32] {
        &self.floor[channel]
    }

    pub fn in_calibration(&self, channel: usize) -> bool {
        self.frames_seen[channel] < self.calibration_frames as u64
    }

    pub fn set_calibration_frames(&mut self, frames: usize) {
        self.calibration_frames = frames;
    }

    /// Back to the zero-initialized profile and a fresh calibration window.
    pub fn reset(&mut self) {
        for floor in &mut self.floor {
            floor.fill(0.0);
        }
        self.frames_seen.fill(0);
    }
}
