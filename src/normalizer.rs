//! Clipping-safe output gain control.
//!
//! A decaying peak follower per channel drives a smoothed gain: when the
//! followed peak rises above the ceiling the gain moves quickly toward the
//! value that brings it back under; when the signal sits comfortably below,
//! the gain relaxes toward unity at a much slower rate. The gain itself is
//! smoothed per sample so level changes never land as steps, and a final
//! clamp makes the ceiling absolute while the gain is still converging.

/// Full-scale output ceiling.
pub const CEILING: f32 = 1.0;

/// Per-sample decay of the peak follower. Roughly a 100 ms half-life at
/// 48 kHz, slow enough that short gaps between peaks do not pump the gain.
pub const PEAK_DECAY: f32 = 0.99986;

/// Per-sample smoothing toward a lower gain target. Settles in a couple of
/// milliseconds so overs are caught almost immediately.
pub const GAIN_ATTACK_COEFF: f32 = 0.95;

/// Per-sample smoothing back toward unity. Recovery takes on the order of
/// seconds, which is what keeps the result free of audible pumping.
pub const GAIN_RELEASE_COEFF: f32 = 0.9998;

pub struct OutputNormalizer {
    ceiling: f32,
    /// Decaying peak estimate per channel.
    peak: Vec<f32>,
    /// Currently applied gain per channel.
    gain: Vec<f32>,
}

impl OutputNormalizer {
    pub fn new(channels: usize) -> Self {
        Self {
            ceiling: CEILING,
            peak: vec![0.0; channels],
            gain: vec![1.0; channels],
        }
    }

    /// Scale one channel's finished samples in place.
    pub fn process(&mut self, channel: usize, samples: &mut [f32]) {
        let mut peak = self.peak[channel];
        let mut gain = self.gain[channel];
        for s in samples.iter_mut() {
            let magnitude = s.abs();
            peak *= PEAK_DECAY;
            if magnitude > peak {
                peak = magnitude;
            }

            let target = if peak > self.ceiling {
                self.ceiling / peak
            } else {
                1.0
            };
            let coeff = if target < gain {
                GAIN_ATTACK_COEFF
            } else {
                GAIN_RELEASE_COEFF
            };
            gain = coeff * gain + (1.0 - coeff) * target;

            *s = (*s * gain).clamp(-self.ceiling, self.ceiling);
        }
        self.peak[channel] = peak;
        self.gain[channel] = gain;
    }

    pub fn gain(&self, channel: usize) -> f32 {
        self.gain[channel]
    }

    pub fn reset(&mut self) {
        self.peak.fill(0.0);
        self.gain.fill(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_passes_untouched() {
        let mut norm = OutputNormalizer::new(1);
        let mut samples: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
        let original = samples.clone();
        norm.process(0, &mut samples);
        assert_eq!(samples, original);
        assert_eq!(norm.gain(0), 1.0);
    }

    #[test]
    fn hot_signal_never_exceeds_the_ceiling() {
        let mut norm = OutputNormalizer::new(1);
        // 10x full scale.
        let mut samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.13).sin() * 10.0).collect();
        norm.process(0, &mut samples);
        assert!(samples.iter().all(|&s| s.abs() <= CEILING));
        // The gain must have converged near 1/10 rather than relying on the
        // clamp alone.
        assert!(norm.gain(0) < 0.12, "gain {}", norm.gain(0));
    }

    #[test]
    fn gain_recovers_slowly_after_the_peak_passes() {
        let mut norm = OutputNormalizer::new(1);
        let mut loud: Vec<f32> = vec![4.0; 2048];
        norm.process(0, &mut loud);
        let ducked = norm.gain(0);
        assert!(ducked < 0.3);

        let mut quiet = vec![0.01f32; 256];
        norm.process(0, &mut quiet);
        let recovering = norm.gain(0);
        // Moving back toward unity, but bounded per block.
        assert!(recovering > ducked);
        assert!(recovering < ducked + 0.3, "recovery jumped: {recovering}");
    }

    #[test]
    fn channels_are_independent() {
        let mut norm = OutputNormalizer::new(2);
        let mut hot = vec![5.0f32; 1024];
        let mut cold = vec![0.1f32; 1024];
        norm.process(0, &mut hot);
        norm.process(1, &mut cold);
        assert!(norm.gain(0) < 0.5);
        assert_eq!(norm.gain(1), 1.0);
    }
}
