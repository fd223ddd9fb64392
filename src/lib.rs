//! ClearWave: streaming spectral-gating noise reduction.
//!
//! Short overlapping blocks are windowed, transformed to the frequency
//! domain, attenuated per bin against an adaptive noise-floor estimate,
//! reconstructed by overlap-add and level-protected against clipping. The
//! whole engine lives behind [`pipeline::DenoisePipeline`]; device I/O, the
//! control surface and settings persistence are collaborators that talk to
//! it through [`block::AudioBlock`]s and [`config::ConfigUpdate`]s.

/// Audio block container.
pub mod block;
/// Control commands for the processing thread.
pub mod command;
/// Validated configuration and partial updates.
pub mod config;
/// Session engine with the bounded block handoff.
pub mod engine;
pub mod error;
/// Frame assembly and windowing.
pub mod framing;
/// Per-bin gating mask.
pub mod gate;
pub mod logging;
/// Adaptive noise-floor estimation.
pub mod noise_floor;
/// Clipping-safe output gain.
pub mod normalizer;
/// Overlap-add reconstruction.
pub mod overlap;
/// The orchestrator tying the stages together.
pub mod pipeline;
/// TOML settings for the CLI.
pub mod settings;
/// Real-input FFT wrapper.
pub mod spectrum;

/// Live duplex device I/O.
#[cfg(feature = "live")]
pub mod audio_io;

pub use block::AudioBlock;
pub use config::{ConfigUpdate, DenoiseConfig, WindowKind};
pub use error::DenoiseError;
pub use pipeline::{DenoisePipeline, PipelineStats};
