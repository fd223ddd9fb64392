//! Overlap-add reconstruction with a carried tail per channel.
//!
//! Each gated frame crossfades its leading overlap region against the tail
//! carried from the previous frame. Because the frame taper's edge ramps are
//! complementary, the crossfade is a plain add of the tapered regions; the
//! emitted hop is divided by the precomputed stack of window contributions,
//! which is identically one for overlaps up to one half and corrects the
//! amplitude exactly beyond that.

pub struct OverlapAdd {
    hop: usize,
    /// Carried samples per channel, `frame_size - hop` each.
    tail: Vec<Vec<f32>>,
    /// Summed window contributions for each emitted offset.
    norm: Vec<f32>,
}

impl OverlapAdd {
    pub fn new(channels: usize, frame_size: usize, hop: usize, window: &[f32]) -> Self {
        debug_assert_eq!(window.len(), frame_size);
        debug_assert!(hop > 0 && hop <= frame_size);
        let tail_len = frame_size - hop;
        let mut norm = vec![0.0; hop];
        for (i, n) in norm.iter_mut().enumerate() {
            let mut offset = i;
            while offset < frame_size {
                *n += window[offset];
                offset += hop;
            }
            // A window can be zero across a whole hop column only if the
            // taper was built against a different hop; guard regardless.
            if *n < 1e-6 {
                *n = 1.0;
            }
        }
        Self {
            hop,
            tail: vec![vec![0.0; tail_len]; channels],
            norm,
        }
    }

    /// Fold one channel's inverse-transformed frame into the stream:
    /// append `hop` finished samples to `out` and carry the rest.
    /// `frame` is consumed as scratch.
    pub fn push_frame(&mut self, channel: usize, frame: &mut [f32], out: &mut Vec<f32>) {
        let tail = &mut self.tail[channel];
        for (f, &t) in frame.iter_mut().zip(tail.iter()) {
            *f += t;
        }
        out.extend(
            frame[..self.hop]
                .iter()
                .zip(&self.norm)
                .map(|(&s, &n)| s / n),
        );
        tail.copy_from_slice(&frame[self.hop..]);
    }

    /// Forget the carried tails, as after a reset or layout change.
    pub fn reset(&mut self) {
        for tail in &mut self.tail {
            tail.fill(0.0);
        }
    }
}
