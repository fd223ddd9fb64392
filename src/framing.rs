//! Frame assembly and windowing.
//!
//! Incoming blocks of arbitrary length are appended to a per-channel
//! residual buffer; whole analysis frames are extracted at hop-size spacing
//! and tapered before they leave this module. The taper is flat in the
//! middle with complementary edge ramps of the overlap length, so the ramps
//! of consecutive frames sum to one at every offset and an ungated
//! overlap-add reconstructs the original amplitude.

use std::f32::consts::PI;

use crate::block::MAX_BLOCK_SAMPLES;
use crate::config::WindowKind;

/// Build the analysis taper: `ramp_len` samples up, flat 1.0, `ramp_len`
/// samples down, with `w[len - ramp_len + i] = 1 - w[i]`. At 50% overlap
/// with `WindowKind::Hann` this is the periodic Hann window.
pub fn build_window(kind: WindowKind, len: usize, ramp_len: usize) -> Vec<f32> {
    debug_assert!(ramp_len <= len, "ramp exceeds frame");
    let ramp = |i: usize| {
        let t = i as f32 / ramp_len as f32;
        match kind {
            WindowKind::Hann => 0.5 * (1.0 - (PI * t).cos()),
            WindowKind::Linear => t,
        }
    };
    let mut window = vec![1.0; len];
    if ramp_len == 0 {
        return window;
    }
    // The ramps only share samples when the overlap exceeds half the frame;
    // multiplying keeps the taper smooth there, and the reconstructor's
    // window-sum curve restores the amplitude either way.
    for (i, w) in window.iter_mut().enumerate() {
        if i < ramp_len {
            *w *= ramp(i);
        }
        if i >= len - ramp_len {
            *w *= 1.0 - ramp(i - (len - ramp_len));
        }
    }
    window
}

/// Per-channel residual buffering and windowed frame extraction.
pub struct FrameBuffer {
    frame_size: usize,
    hop: usize,
    window: Vec<f32>,
    /// Unconsumed samples per channel. All channels hold `buffered` samples.
    residual: Vec<Vec<f32>>,
    buffered: usize,
}

impl FrameBuffer {
    pub fn new(channels: usize, frame_size: usize, hop: usize, window: Vec<f32>) -> Self {
        debug_assert_eq!(window.len(), frame_size);
        debug_assert!(hop > 0 && hop <= frame_size);
        let capacity = frame_size + MAX_BLOCK_SAMPLES;
        Self {
            frame_size,
            hop,
            window,
            residual: (0..channels).map(|_| Vec::with_capacity(capacity)).collect(),
            buffered: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.residual.len()
    }

    /// Append one block's worth of samples. Channel count and equal channel
    /// lengths are the caller's contract (the orchestrator checks both).
    pub fn push(&mut self, samples: &[Vec<f32>]) {
        debug_assert_eq!(samples.len(), self.residual.len());
        for (res, ch) in self.residual.iter_mut().zip(samples) {
            res.extend_from_slice(ch);
        }
        self.buffered += samples.first().map_or(0, |ch| ch.len());
    }

    pub fn frame_ready(&self) -> bool {
        self.buffered >= self.frame_size
    }

    /// Copy the next windowed frame for every channel into `frames` and
    /// advance by one hop. `frames[ch]` must be `frame_size` long.
    pub fn pop_frame_into(&mut self, frames: &mut [Vec<f32>]) {
        debug_assert!(self.frame_ready());
        for (out, res) in frames.iter_mut().zip(&mut self.residual) {
            for (o, (&s, &w)) in out
                .iter_mut()
                .zip(res[..self.frame_size].iter().zip(&self.window))
            {
                *o = s * w;
            }
            res.copy_within(self.hop.., 0);
            res.truncate(res.len() - self.hop);
        }
        self.buffered -= self.hop;
    }

    /// Drop all buffered residue, keeping the allocation.
    pub fn clear(&mut self) {
        for res in &mut self.residual {
            res.clear();
        }
        self.buffered = 0;
    }
}
