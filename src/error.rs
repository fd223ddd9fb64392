use thiserror::Error;

/// Recoverable errors reported by the denoising pipeline.
///
/// None of these are fatal to the pipeline instance. A `ChannelMismatch`
/// requires an explicit `reset()` before blocks with the new channel count
/// are accepted; everything else leaves the previous state fully intact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenoiseError {
    /// Rejected configuration. The prior valid configuration stays in effect.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// Incoming block's channel count differs from the locked channel count.
    #[error("channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    /// Block exceeds the preallocated per-channel maximum.
    #[error("block too large: {len} samples per channel, maximum {max}")]
    BlockTooLarge { len: usize, max: usize },

    /// A process or configure call is already in flight on this instance.
    /// Callers must serialize calls per instance.
    #[error("pipeline busy: another call is in flight")]
    Busy,

    /// The pipeline was closed and rejects further calls.
    #[error("pipeline closed")]
    Closed,
}
