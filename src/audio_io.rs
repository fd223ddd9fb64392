//! Live duplex audio I/O over cpal.
//!
//! The input-stream callback only moves samples into a lock-free ring; all
//! processing happens in the output-stream callback, which assembles blocks,
//! runs the pipeline and plays the result, zero-filling on underrun. Control
//! commands arrive over the same kind of lock-free queue the engine uses, so
//! neither callback ever takes a lock or blocks.

use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, StreamConfig};
use crossbeam::channel::Receiver;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

use crate::block::AudioBlock;
use crate::command::Command;
use crate::engine::handle_command;
use crate::pipeline::DenoisePipeline;

#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Substring match against the input device name; default input device
    /// when unset. The denoiser typically reads from a loopback device.
    pub input_device: Option<String>,
    /// Substring match against the output device name.
    pub output_device: Option<String>,
    /// Frames per block handed to the pipeline.
    pub block_frames: usize,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            block_frames: 1024,
        }
    }
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<Device> {
    match name {
        Some(pattern) => host
            .input_devices()
            .context("enumerating input devices")?
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&pattern.to_lowercase()))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no input device matching '{pattern}'")),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device")),
    }
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<Device> {
    match name {
        Some(pattern) => host
            .output_devices()
            .context("enumerating output devices")?
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&pattern.to_lowercase()))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no output device matching '{pattern}'")),
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device")),
    }
}

/// Run the duplex stream until `stop_rx` fires. Blocks the calling thread.
pub fn run_duplex_stream<C>(
    mut pipeline: DenoisePipeline,
    mut commands: C,
    stop_rx: Receiver<()>,
    options: &LiveOptions,
) -> anyhow::Result<()>
where
    C: Consumer<Item = Command> + Send + 'static,
{
    let host = cpal::default_host();
    let input_device = find_input_device(&host, options.input_device.as_deref())?;
    let output_device = find_output_device(&host, options.output_device.as_deref())?;

    let input_default = input_device
        .default_input_config()
        .context("no default input config")?;
    let output_default = output_device
        .default_output_config()
        .context("no default output config")?;
    if input_default.sample_format() != SampleFormat::F32
        || output_default.sample_format() != SampleFormat::F32
    {
        bail!("only f32 sample streams are supported");
    }

    let sample_rate = input_default.sample_rate();
    if output_default.sample_rate() != sample_rate {
        // Resampling is not this crate's business; the user picks devices
        // that agree on a rate.
        bail!(
            "device sample rates differ: input {} Hz, output {} Hz",
            sample_rate.0,
            output_default.sample_rate().0
        );
    }
    let channels = input_default.channels().min(output_default.channels()) as usize;
    if channels == 0 {
        bail!("selected devices expose no common channels");
    }

    log::info!(
        "duplex stream: '{}' -> '{}', {} Hz, {} channel(s)",
        input_device.name().unwrap_or_default(),
        output_device.name().unwrap_or_default(),
        sample_rate.0,
        channels
    );

    let buffer_size = BufferSize::Fixed(options.block_frames as u32);
    let input_config = StreamConfig {
        channels: channels as u16,
        sample_rate,
        buffer_size,
    };
    let output_config = input_config.clone();

    // Transport rings, sized to ride out several callbacks of jitter.
    let ring_capacity = options.block_frames * channels * 8;
    let (mut capture_prod, mut capture_cons) = HeapRb::<f32>::new(ring_capacity).split();

    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // All or nothing, so the ring never holds a torn frame and
                // channel alignment survives an overrun.
                if capture_prod.vacant_len() >= data.len() {
                    capture_prod.push_slice(data);
                } else {
                    log::trace!("capture ring full, dropped {} samples", data.len());
                }
            },
            |err| log::error!("input stream error: {err}"),
            None,
        )
        .context("building input stream")?;

    let block_samples = options.block_frames * channels;
    let mut capture_scratch = vec![0.0f32; block_samples];
    let mut interleave_scratch: Vec<f32> = Vec::with_capacity(block_samples);
    let mut pending: VecDeque<f32> = VecDeque::with_capacity(ring_capacity);
    let mut bypass = false;
    let rate = sample_rate.0;

    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Some(command) = commands.try_pop() {
                    handle_command(command, &mut pipeline, &mut bypass);
                }

                // Drain whatever the capture side has accumulated, block by
                // block, so output latency does not grow over time. Only
                // whole frames are taken to keep channels aligned.
                loop {
                    let avail = capture_cons.occupied_len();
                    let take = (avail - avail % channels).min(capture_scratch.len());
                    if take == 0 {
                        break;
                    }
                    let got = capture_cons.pop_slice(&mut capture_scratch[..take]);
                    let block =
                        AudioBlock::from_interleaved(rate, channels, &capture_scratch[..got]);
                    if bypass {
                        pending.extend(&capture_scratch[..got]);
                        continue;
                    }
                    match pipeline.process(&block) {
                        Ok(out) => {
                            out.to_interleaved(&mut interleave_scratch);
                            pending.extend(interleave_scratch.iter());
                        }
                        Err(e) => log::error!("block rejected: {e}"),
                    }
                }

                for slot in data.iter_mut() {
                    *slot = pending.pop_front().unwrap_or(0.0);
                }
            },
            |err| log::error!("output stream error: {err}"),
            None,
        )
        .context("building output stream")?;

    input_stream.play().context("starting input stream")?;
    output_stream.play().context("starting output stream")?;

    // Keep the streams alive until a stop signal is received.
    while stop_rx
        .recv_timeout(std::time::Duration::from_millis(100))
        .is_err()
    {}

    Ok(())
}
