//! Pipeline orchestration.
//!
//! Owns every piece of per-channel state and sequences one block through
//! framing, the forward transform, the noise-floor update, the gate, the
//! inverse transform, overlap-add and the output normalizer. Configuration
//! changes are staged and applied only at a frame boundary, so no in-flight
//! frame ever observes a torn configuration.

use rustfft::num_complex::Complex;

use crate::block::{AudioBlock, MAX_BLOCK_SAMPLES};
use crate::config::{ConfigUpdate, DenoiseConfig};
use crate::error::DenoiseError;
use crate::framing::{build_window, FrameBuffer};
use crate::gate::SpectralGate;
use crate::noise_floor::NoiseFloorEstimator;
use crate::normalizer::OutputNormalizer;
use crate::overlap::OverlapAdd;
use crate::spectrum::SpectralTransform;

/// Consecutive yield-less `process` calls before a starvation warning.
const STARVATION_CALLS: u32 = 64;

/// Cumulative observability counters. Never reset by `reset()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Non-finite input samples replaced with zero.
    pub sanitized_samples: u64,
    /// Analysis frames fully processed.
    pub frames_processed: u64,
    /// Starvation warnings emitted.
    pub starvation_warnings: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Ready,
    Processing,
    Closed,
}

/// All per-channel DSP state. Built lazily when the first block locks the
/// channel count, rebuilt on reset or frame-layout changes.
struct DspState {
    channels: usize,
    framer: FrameBuffer,
    transform: SpectralTransform,
    estimator: NoiseFloorEstimator,
    gate: SpectralGate,
    ola: OverlapAdd,
    normalizer: OutputNormalizer,
    /// Sanitized copy of the incoming block, reused across calls.
    input: Vec<Vec<f32>>,
    /// Windowed frame per channel, reused across frames.
    frame: Vec<Vec<f32>>,
    bins: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl DspState {
    fn new(channels: usize, config: &DenoiseConfig) -> Self {
        let size = config.buffer_size;
        let hop = config.hop_size();
        let bins = config.num_bins();
        let window = build_window(config.window, size, config.overlap_len());
        Self {
            channels,
            framer: FrameBuffer::new(channels, size, hop, window.clone()),
            transform: SpectralTransform::new(size),
            estimator: NoiseFloorEstimator::new(channels, bins, config.calibration_frames),
            gate: SpectralGate::new(channels, bins, config.noise_reduction),
            ola: OverlapAdd::new(channels, size, hop, &window),
            normalizer: OutputNormalizer::new(channels),
            input: vec![Vec::with_capacity(MAX_BLOCK_SAMPLES); channels],
            frame: vec![vec![0.0; size]; channels],
            bins: vec![Complex::new(0.0, 0.0); bins],
            magnitudes: vec![0.0; bins],
        }
    }
}

/// The streaming spectral-gating engine.
///
/// One instance owns one stream. Calls must be serialized per instance;
/// the state machine rejects anything else rather than racing.
pub struct DenoisePipeline {
    config: DenoiseConfig,
    pending: Option<DenoiseConfig>,
    state: PipelineState,
    dsp: Option<DspState>,
    stats: PipelineStats,
    starve_streak: u32,
}

impl DenoisePipeline {
    /// Validates the configuration; an invalid one never constructs.
    pub fn new(config: DenoiseConfig) -> Result<Self, DenoiseError> {
        config.validate()?;
        Ok(Self {
            config,
            pending: None,
            state: PipelineState::Ready,
            dsp: None,
            stats: PipelineStats::default(),
            starve_streak: 0,
        })
    }

    pub fn config(&self) -> &DenoiseConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Channel count locked by the first processed block, if any.
    pub fn channels(&self) -> Option<usize> {
        self.dsp.as_ref().map(|d| d.channels)
    }

    /// Stage a validated partial update. It takes effect at the next frame
    /// boundary; on rejection the previous configuration stays in force.
    pub fn configure(&mut self, update: &ConfigUpdate) -> Result<(), DenoiseError> {
        match self.state {
            PipelineState::Closed => return Err(DenoiseError::Closed),
            PipelineState::Processing => return Err(DenoiseError::Busy),
            PipelineState::Ready => {}
        }
        let merged = update.apply_to(self.pending.as_ref().unwrap_or(&self.config));
        merged.validate()?;
        self.pending = Some(merged);
        Ok(())
    }

    /// Run one block through the pipeline and return the finished samples.
    /// The output carries the input's sample rate and channel count; its
    /// length is however many whole hops became available.
    pub fn process(&mut self, block: &AudioBlock) -> Result<AudioBlock, DenoiseError> {
        match self.state {
            PipelineState::Closed => return Err(DenoiseError::Closed),
            PipelineState::Processing => return Err(DenoiseError::Busy),
            PipelineState::Ready => {}
        }
        self.state = PipelineState::Processing;
        let result = self.process_inner(block);
        // Errors are recoverable; the instance goes back to accepting calls.
        self.state = PipelineState::Ready;
        result
    }

    fn process_inner(&mut self, block: &AudioBlock) -> Result<AudioBlock, DenoiseError> {
        // Channels are equal-length by construction of AudioBlock; clip to
        // the shortest one anyway so a hand-built ragged block cannot skew
        // the per-channel residues against each other.
        let frames = block
            .samples
            .iter()
            .map(|ch| ch.len())
            .min()
            .unwrap_or(0);
        if frames > MAX_BLOCK_SAMPLES {
            return Err(DenoiseError::BlockTooLarge {
                len: frames,
                max: MAX_BLOCK_SAMPLES,
            });
        }

        self.apply_pending();

        let channels = block.channels();
        if let Some(dsp) = &self.dsp {
            if dsp.channels != channels {
                return Err(DenoiseError::ChannelMismatch {
                    expected: dsp.channels,
                    got: channels,
                });
            }
        } else {
            self.dsp = Some(DspState::new(channels, &self.config));
        }
        let dsp = self.dsp.as_mut().expect("dsp state just ensured");

        // Sanitize into the reusable input copy: NaN and infinity become
        // zero and are counted, processing continues uninterrupted.
        for (dst, src) in dsp.input.iter_mut().zip(&block.samples) {
            dst.clear();
            for &s in &src[..frames] {
                if s.is_finite() {
                    dst.push(s);
                } else {
                    dst.push(0.0);
                    self.stats.sanitized_samples += 1;
                }
            }
        }
        dsp.framer.push(&dsp.input);

        let mut out: Vec<Vec<f32>> = (0..channels).map(|_| Vec::new()).collect();
        let mut frames_emitted = 0u64;
        while dsp.framer.frame_ready() {
            dsp.framer.pop_frame_into(&mut dsp.frame);
            for ch in 0..channels {
                dsp.transform.forward(&dsp.frame[ch], &mut dsp.bins);
                for (mag, bin) in dsp.magnitudes.iter_mut().zip(&dsp.bins) {
                    *mag = bin.norm();
                }
                dsp.estimator.update(ch, &dsp.magnitudes);
                let mask = dsp.gate.compute_mask(ch, &dsp.magnitudes, dsp.estimator.floor(ch));
                for (bin, &m) in dsp.bins.iter_mut().zip(mask) {
                    *bin *= m;
                }
                dsp.transform.inverse(&dsp.bins, &mut dsp.frame[ch]);
                dsp.ola.push_frame(ch, &mut dsp.frame[ch], &mut out[ch]);
            }
            frames_emitted += 1;
        }
        self.stats.frames_processed += frames_emitted;

        for (ch, samples) in out.iter_mut().enumerate() {
            dsp.normalizer.process(ch, samples);
        }

        if frames_emitted == 0 && frames > 0 {
            self.starve_streak += 1;
            if self.starve_streak >= STARVATION_CALLS {
                self.starve_streak = 0;
                self.stats.starvation_warnings += 1;
                log::warn!(
                    "input starvation: {} consecutive blocks too short to fill a {}-sample frame",
                    STARVATION_CALLS,
                    self.config.buffer_size
                );
            }
        } else if frames_emitted > 0 {
            self.starve_streak = 0;
        }

        Ok(AudioBlock {
            sample_rate: block.sample_rate,
            samples: out,
        })
    }

    /// Clear all adaptive per-channel state and unlock the channel count.
    /// The configuration survives; cumulative stats survive.
    pub fn reset(&mut self) -> Result<(), DenoiseError> {
        match self.state {
            PipelineState::Closed => return Err(DenoiseError::Closed),
            PipelineState::Processing => return Err(DenoiseError::Busy),
            PipelineState::Ready => {}
        }
        self.dsp = None;
        self.starve_streak = 0;
        Ok(())
    }

    /// Shut the instance down; every later call is rejected.
    pub fn close(&mut self) {
        self.state = PipelineState::Closed;
        self.dsp = None;
    }

    /// Apply a staged configuration at a frame boundary. Changes to the
    /// frame layout rebuild the framing, transform and overlap state (and
    /// drop the unconsumed residue); a buffer-size change also restarts the
    /// noise profile because the bin layout moved underneath it. Soft
    /// changes keep every piece of adaptive state.
    fn apply_pending(&mut self) {
        let Some(next) = self.pending.take() else {
            return;
        };
        let prev = self.config;
        self.config = next;

        let Some(dsp) = self.dsp.as_mut() else {
            return;
        };

        let layout_changed = next.buffer_size != prev.buffer_size
            || next.overlap != prev.overlap
            || next.window != prev.window;
        if next.buffer_size != prev.buffer_size {
            *dsp = DspState::new(dsp.channels, &next);
            return;
        }
        if layout_changed {
            let window = build_window(next.window, next.buffer_size, next.overlap_len());
            dsp.framer = FrameBuffer::new(
                dsp.channels,
                next.buffer_size,
                next.hop_size(),
                window.clone(),
            );
            dsp.ola = OverlapAdd::new(dsp.channels, next.buffer_size, next.hop_size(), &window);
        }
        if next.noise_reduction != prev.noise_reduction {
            dsp.gate.set_noise_reduction(next.noise_reduction);
        }
        if next.calibration_frames != prev.calibration_frames {
            dsp.estimator.set_calibration_frames(next.calibration_frames);
        }
    }
}
