use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use clearwave::block::AudioBlock;
use clearwave::config::{ConfigUpdate, DenoiseConfig, WindowKind};
use clearwave::logging;
use clearwave::pipeline::DenoisePipeline;
use clearwave::settings::Settings;

/// Frames per block fed to the pipeline in file mode.
const FILE_BLOCK_FRAMES: usize = 1024;

#[derive(Parser)]
#[command(name = "clearwave", about = "Streaming spectral-gating noise reducer")]
struct Cli {
    /// Optional TOML settings file; CLI flags override its values
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Gate aggressiveness, 0.0 (off) to 1.0
    #[arg(long, global = true)]
    noise_reduction: Option<f32>,

    /// Analysis frame length in samples, power of two
    #[arg(long, global = true)]
    buffer_size: Option<usize>,

    /// Frame overlap fraction, 0.0 to just under 1.0
    #[arg(long, global = true)]
    overlap: Option<f32>,

    /// Frame taper: hann or linear
    #[arg(long, global = true, value_parser = parse_window)]
    window: Option<WindowKind>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Denoise a WAV file
    File {
        input: PathBuf,
        output: PathBuf,
    },
    /// Run live between two audio devices until Ctrl-C
    #[cfg(feature = "live")]
    Live {
        /// Input device name substring (e.g. a loopback device)
        #[arg(long)]
        input_device: Option<String>,
        /// Output device name substring
        #[arg(long)]
        output_device: Option<String>,
        /// Frames per hardware block
        #[arg(long)]
        block_frames: Option<usize>,
    },
}

fn parse_window(s: &str) -> Result<WindowKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "hann" => Ok(WindowKind::Hann),
        "linear" => Ok(WindowKind::Linear),
        other => Err(format!("unknown window '{other}', expected hann or linear")),
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    // Built-in defaults, then the settings file, then explicit flags.
    let mut config = settings.denoise.apply_to(&DenoiseConfig::default());
    let flags = ConfigUpdate {
        noise_reduction: cli.noise_reduction,
        buffer_size: cli.buffer_size,
        overlap: cli.overlap,
        window: cli.window,
        calibration_frames: None,
    };
    config = flags.apply_to(&config);

    match cli.command {
        Cmd::File { input, output } => run_file(config, &input, &output),
        #[cfg(feature = "live")]
        Cmd::Live {
            input_device,
            output_device,
            block_frames,
        } => {
            let options = clearwave::audio_io::LiveOptions {
                input_device: input_device.or(settings.input_device),
                output_device: output_device.or(settings.output_device),
                block_frames: block_frames
                    .or(settings.block_frames)
                    .unwrap_or_else(|| clearwave::audio_io::LiveOptions::default().block_frames),
            };
            run_live(config, options)
        }
    }
}

fn run_file(config: DenoiseConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("reading float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("reading integer samples")?
        }
    };
    let total_frames = samples.len() / channels;

    let mut pipeline =
        DenoisePipeline::new(config).map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let out_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, out_spec)
        .with_context(|| format!("creating {}", output.display()))?;

    println!(
        "Denoising {} frames at {} Hz, {} channel(s)",
        total_frames, spec.sample_rate, channels
    );
    let start_time = std::time::Instant::now();

    let mut interleaved = Vec::new();
    let mut written = 0usize;
    let mut write_block = |block: &AudioBlock,
                           interleaved: &mut Vec<f32>,
                           written: &mut usize|
     -> anyhow::Result<()> {
        block.to_interleaved(interleaved);
        let remaining = (total_frames - *written) * channels;
        for &sample in interleaved.iter().take(remaining) {
            let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(s).context("writing sample")?;
        }
        *written += (interleaved.len() / channels).min(total_frames - *written);
        Ok(())
    };

    for chunk in samples.chunks(FILE_BLOCK_FRAMES * channels) {
        let block = AudioBlock::from_interleaved(spec.sample_rate, channels, chunk);
        let out = pipeline
            .process(&block)
            .map_err(|e| anyhow::anyhow!("processing failed: {e}"))?;
        write_block(&out, &mut interleaved, &mut written)?;
    }

    // The pipeline holds up to a frame of residue plus the overlap tail;
    // push silence through until the file length is reached.
    let mut drain_guard = config.buffer_size / config.hop_size() + 8;
    while written < total_frames && drain_guard > 0 {
        let silence = AudioBlock::silence(spec.sample_rate, channels, FILE_BLOCK_FRAMES);
        let out = pipeline
            .process(&silence)
            .map_err(|e| anyhow::anyhow!("processing failed: {e}"))?;
        write_block(&out, &mut interleaved, &mut written)?;
        drain_guard -= 1;
    }

    drop(write_block);
    writer.finalize().context("finalizing WAV file")?;

    let stats = pipeline.stats();
    println!(
        "Done in {:.2}s: {} frames processed, {} samples sanitized",
        start_time.elapsed().as_secs_f32(),
        stats.frames_processed,
        stats.sanitized_samples
    );
    Ok(())
}

#[cfg(feature = "live")]
fn run_live(config: DenoiseConfig, options: clearwave::audio_io::LiveOptions) -> anyhow::Result<()> {
    use clearwave::command::Command;
    use ringbuf::traits::Split;
    use ringbuf::HeapRb;

    let pipeline =
        DenoisePipeline::new(config).map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // No interactive control surface here; the command queue exists so one
    // can be attached without touching the audio path.
    let rb = HeapRb::<Command>::new(64);
    let (_command_producer, command_consumer) = rb.split();

    let (stop_tx, stop_rx) = crossbeam::channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl-C handler")?;

    println!("Denoising live; press Ctrl-C to stop.");
    clearwave::audio_io::run_duplex_stream(pipeline, command_consumer, stop_rx, &options)
}
