//! Audio block container passed between the I/O collaborators and the core.

/// Upper bound on samples per channel in a single block. Residual buffers are
/// preallocated against this so steady-state processing never reallocates.
pub const MAX_BLOCK_SAMPLES: usize = 65536;

/// A block of planar audio: one `Vec<f32>` per channel, all the same length.
///
/// Blocks are ephemeral. The I/O side produces one per hardware callback and
/// the pipeline consumes it and hands back a fresh output block. Block length
/// may vary call to call and is unrelated to the analysis frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub sample_rate: u32,
    pub samples: Vec<Vec<f32>>,
}

impl AudioBlock {
    /// Empty block with `channels` channels.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            samples: vec![Vec::new(); channels],
        }
    }

    /// Block of `frames` zero samples per channel.
    pub fn silence(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            samples: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Samples per channel. Channels are kept equal-length by construction.
    pub fn frames(&self) -> usize {
        self.samples.first().map_or(0, |ch| ch.len())
    }

    /// Deinterleave a device-side buffer (frame-major, channel-minor) into a
    /// planar block. Trailing samples of a partial frame are dropped.
    pub fn from_interleaved(sample_rate: u32, channels: usize, data: &[f32]) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        let mut samples = vec![Vec::with_capacity(frames); channels];
        for frame in data.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                samples[ch].push(s);
            }
        }
        Self {
            sample_rate,
            samples,
        }
    }

    /// Interleave back into a device-side buffer layout.
    pub fn to_interleaved(&self, out: &mut Vec<f32>) {
        out.clear();
        let frames = self.frames();
        out.reserve(frames * self.channels());
        for i in 0..frames {
            for ch in &self.samples {
                out.push(ch[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_round_trip() {
        let data = [0.0, 1.0, 0.1, 1.1, 0.2, 1.2];
        let block = AudioBlock::from_interleaved(48000, 2, &data);
        assert_eq!(block.channels(), 2);
        assert_eq!(block.frames(), 3);
        assert_eq!(block.samples[0], vec![0.0, 0.1, 0.2]);
        assert_eq!(block.samples[1], vec![1.0, 1.1, 1.2]);

        let mut out = Vec::new();
        block.to_interleaved(&mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let data = [0.0, 1.0, 0.1];
        let block = AudioBlock::from_interleaved(44100, 2, &data);
        assert_eq!(block.frames(), 1);
    }
}
