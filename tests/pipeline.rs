//! End-to-end properties of the denoising pipeline.

use clearwave::{AudioBlock, ConfigUpdate, DenoiseConfig, DenoisePipeline, WindowKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 48000;

fn tone(freq: f32, amp: f32, len: usize) -> Vec<f32> {
    // Phase in f64: an f32 accumulator drifts by whole milliradians over a
    // couple of seconds, which would smear the tone across the spectrum.
    let omega = 2.0 * std::f64::consts::PI * freq as f64 / SAMPLE_RATE as f64;
    (0..len)
        .map(|i| ((omega * i as f64).sin() * amp as f64) as f32)
        .collect()
}

fn white_noise(sigma: f32, len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    (0..len).map(|_| normal.sample(&mut rng)).collect()
}

/// Feed a mono signal through in `block_len`-sample blocks and collect the
/// emitted output. Output sample n corresponds to input sample n.
fn run_mono(pipeline: &mut DenoisePipeline, input: &[f32], block_len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(input.len());
    for chunk in input.chunks(block_len) {
        let block = AudioBlock {
            sample_rate: SAMPLE_RATE,
            samples: vec![chunk.to_vec()],
        };
        let processed = pipeline.process(&block).expect("process failed");
        out.extend_from_slice(&processed.samples[0]);
    }
    out
}

/// Amplitude of the `freq` component over `x`, via complex projection.
/// All in f64 so the basis stays orthogonal over long windows.
fn tone_amplitude(x: &[f32], freq: f32) -> f32 {
    let omega = 2.0 * std::f64::consts::PI * freq as f64 / SAMPLE_RATE as f64;
    let (mut re, mut im) = (0.0f64, 0.0f64);
    for (n, &s) in x.iter().enumerate() {
        let phase = omega * n as f64;
        re += s as f64 * phase.cos();
        im += s as f64 * phase.sin();
    }
    let n = x.len() as f64;
    (2.0 * (re * re + im * im).sqrt() / n) as f32
}

/// Summed energy of `x` at a set of probe frequencies. With a window that
/// is a whole number of periods of every probe (and of the test tone), the
/// projections are orthogonal and the tone cannot leak into the probes.
fn probe_energy(x: &[f32], probes: &[f32]) -> f32 {
    probes
        .iter()
        .map(|&f| {
            let a = tone_amplitude(x, f);
            a * a
        })
        .sum()
}

fn db(ratio: f32) -> f32 {
    20.0 * ratio.log10()
}

#[test]
fn pass_through_identity_with_open_gate() {
    let config = DenoiseConfig {
        noise_reduction: 0.0,
        buffer_size: 512,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    let input: Vec<f32> = (0..SAMPLE_RATE as usize)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * PI * 440.0 * t).sin() * 0.4 + (2.0 * PI * 1330.0 * t).sin() * 0.3
        })
        .collect();

    // Deliberately awkward block length to exercise the residual buffering.
    let out = run_mono(&mut pipeline, &input, 480);
    assert!(out.len() > SAMPLE_RATE as usize / 2);

    let warmup = config.overlap_len();
    for (i, (got, want)) in out.iter().zip(&input).enumerate().skip(warmup) {
        assert!(
            (got - want).abs() < 1e-4,
            "sample {i}: got {got}, want {want}"
        );
    }
}

#[test]
fn pass_through_holds_for_linear_window_and_odd_overlap() {
    let config = DenoiseConfig {
        noise_reduction: 0.0,
        buffer_size: 512,
        overlap: 0.25,
        window: WindowKind::Linear,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();
    let input = tone(700.0, 0.5, SAMPLE_RATE as usize / 2);
    let out = run_mono(&mut pipeline, &input, 333);

    let warmup = config.overlap_len();
    for (i, (got, want)) in out.iter().zip(&input).enumerate().skip(warmup) {
        assert!(
            (got - want).abs() < 1e-4,
            "sample {i}: got {got}, want {want}"
        );
    }
}

#[test]
fn silence_in_silence_out() {
    let config = DenoiseConfig {
        buffer_size: 1024,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();
    let out = run_mono(&mut pipeline, &vec![0.0; 48000], 512);
    assert!(out.iter().all(|&s| s.abs() < 1e-6));
}

#[test]
fn output_never_clips_at_ten_times_full_scale() {
    for noise_reduction in [0.0, 0.5] {
        let config = DenoiseConfig {
            noise_reduction,
            buffer_size: 1024,
            ..DenoiseConfig::default()
        };
        let mut pipeline = DenoisePipeline::new(config).unwrap();
        let input = tone(1000.0, 10.0, SAMPLE_RATE as usize);
        let out = run_mono(&mut pipeline, &input, 512);
        let peak = out.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!(
            peak <= 1.0 + 1e-6,
            "clipped at {peak} with noise_reduction {noise_reduction}"
        );
    }
}

#[test]
fn steady_tone_has_no_seams_at_block_boundaries() {
    let config = DenoiseConfig {
        noise_reduction: 0.4,
        buffer_size: 1024,
        calibration_frames: 8,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    let amp = 0.5;
    let input = tone(1000.0, amp, 2 * SAMPLE_RATE as usize);
    let out = run_mono(&mut pipeline, &input, 441);

    // The tone's own slope bounds adjacent-sample differences; anything
    // much beyond it would be an audible seam.
    let natural_slope = 2.0 * PI * 1000.0 / SAMPLE_RATE as f32 * amp;
    let mut max_jump = 0.0f32;
    for pair in out[2048..].windows(2) {
        max_jump = max_jump.max((pair[1] - pair[0]).abs());
    }
    assert!(
        max_jump < natural_slope + 0.02,
        "seam of {max_jump} (tone slope {natural_slope})"
    );
}

/// The headline scenario: broadband noise at -40 dBFS, a 1 kHz tone at
/// -6 dBFS switched on after the calibration window, gate at half strength.
#[test]
fn tone_survives_while_noise_is_reduced() {
    let config = DenoiseConfig {
        noise_reduction: 0.5,
        buffer_size: 2048,
        overlap: 0.5,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    let total = 2 * SAMPLE_RATE as usize;
    let tone_onset = 28800; // 0.6 s, past the default calibration window
    let noise = white_noise(0.01, total, 7);
    let carrier = tone(1000.0, 0.5, total);
    let input: Vec<f32> = noise
        .iter()
        .enumerate()
        .map(|(i, &n)| if i >= tone_onset { n + carrier[i] } else { n })
        .collect();

    let out = run_mono(&mut pipeline, &input, 1024);

    // Measure over 0.9 s, an exact number of periods of the tone and of
    // every probe frequency, well after the tone onset transient.
    let lo = SAMPLE_RATE as usize;
    let hi = lo + 43200;
    assert!(out.len() >= hi);
    let in_win = &input[lo..hi];
    let out_win = &out[lo..hi];

    let tone_loss = db(tone_amplitude(out_win, 1000.0) / tone_amplitude(in_win, 1000.0));
    assert!(tone_loss > -1.0, "tone attenuated by {tone_loss} dB");

    // Noise-dominated bins, sampled far away from the tone.
    let probes: Vec<f32> = (4..40).map(|k| k as f32 * 500.0).collect();
    let drop = 10.0 * (probe_energy(out_win, &probes) / probe_energy(in_win, &probes)).log10();
    assert!(drop < -20.0, "noise bins only reduced by {drop} dB");
}

#[test]
fn white_noise_floor_is_gated_down() {
    let config = DenoiseConfig {
        noise_reduction: 0.5,
        buffer_size: 2048,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    let input = white_noise(0.01, 2 * SAMPLE_RATE as usize, 11);
    let out = run_mono(&mut pipeline, &input, 1024);

    // Compare RMS over the last second, long after calibration.
    let lo = out.len() - SAMPLE_RATE as usize;
    let rms = |x: &[f32]| {
        (x.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / x.len() as f64).sqrt() as f32
    };
    let drop = db(rms(&out[lo..]) / rms(&input[lo..lo + SAMPLE_RATE as usize]));
    assert!(drop < -20.0, "noise floor only dropped {drop} dB");
}

#[test]
fn mid_stream_reconfiguration_stays_continuous() {
    let config = DenoiseConfig {
        noise_reduction: 0.2,
        buffer_size: 1024,
        calibration_frames: 8,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    let amp = 0.4;
    let input = tone(1000.0, amp, 2 * SAMPLE_RATE as usize);
    let mut out = Vec::new();
    for (i, chunk) in input.chunks(512).enumerate() {
        // Crank the gate strength up halfway through the stream.
        if i == input.len() / 512 / 2 {
            let update = ConfigUpdate {
                noise_reduction: Some(0.8),
                ..Default::default()
            };
            pipeline.configure(&update).unwrap();
        }
        let block = AudioBlock {
            sample_rate: SAMPLE_RATE,
            samples: vec![chunk.to_vec()],
        };
        out.extend_from_slice(&pipeline.process(&block).unwrap().samples[0]);
    }
    assert_eq!(pipeline.config().noise_reduction, 0.8);

    let natural_slope = 2.0 * PI * 1000.0 / SAMPLE_RATE as f32 * amp;
    let mut max_jump = 0.0f32;
    for pair in out[2048..].windows(2) {
        max_jump = max_jump.max((pair[1] - pair[0]).abs());
    }
    assert!(
        max_jump < natural_slope + 0.05,
        "discontinuity of {max_jump} across the transition"
    );
}

#[test]
fn output_preserves_block_order() {
    let config = DenoiseConfig {
        noise_reduction: 0.0,
        buffer_size: 256,
        ..DenoiseConfig::default()
    };
    let mut pipeline = DenoisePipeline::new(config).unwrap();

    // A slow ramp is strictly increasing, so monotonic output implies the
    // emitted stream kept submission order across unevenly sized blocks.
    let input: Vec<f32> = (0..20000).map(|i| i as f32 * 1e-5).collect();
    let out = run_mono(&mut pipeline, &input, 300);
    for pair in out[256..].windows(2) {
        assert!(pair[1] >= pair[0] - 1e-4);
    }
}
