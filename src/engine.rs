//! Session engine: the supervisory side of the processing handoff.
//!
//! A session owns one denoising pipeline on a dedicated processing thread.
//! Blocks travel through bounded channels in each direction so neither the
//! producer (a hardware callback or file reader) nor the consumer ever
//! blocks on `process`; control changes travel over a lock-free command
//! queue and are applied between blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::block::AudioBlock;
use crate::command::Command;
use crate::config::{ConfigUpdate, DenoiseConfig};
use crate::pipeline::DenoisePipeline;

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the block queues in each direction. Deep enough to ride out
/// scheduling jitter, shallow enough to keep latency bounded.
const BLOCK_QUEUE_CAPACITY: usize = 8;

/// Counters the control thread can poll while a session runs.
#[derive(Clone)]
pub struct SessionStats {
    pub sanitized_samples: Arc<AtomicU64>,
    pub frames_processed: Arc<AtomicU64>,
    pub blocks_dropped: Arc<AtomicU64>,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            sanitized_samples: Arc::new(AtomicU64::new(0)),
            frames_processed: Arc::new(AtomicU64::new(0)),
            blocks_dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

struct EngineState {
    command_producer: ringbuf::HeapProd<Command>,
    stop_sender: Sender<()>,
    input_sender: Sender<AudioBlock>,
    output_receiver: Receiver<AudioBlock>,
    stats: SessionStats,
    sample_rate: u32,
}

// One active session at a time. A denoiser instance serves one stream, so a
// single global slot guarded by a mutex is all the state management needed.
lazy_static! {
    static ref ENGINE: Mutex<Option<EngineState>> = Mutex::new(None);
}

/// Start a processing session. Any running session is stopped first.
pub fn start_session(config: DenoiseConfig, sample_rate: u32) -> anyhow::Result<()> {
    stop_session();

    let pipeline = DenoisePipeline::new(config)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let rb = HeapRb::<Command>::new(COMMAND_QUEUE_CAPACITY);
    let (command_producer, command_consumer) = rb.split();
    let (stop_tx, stop_rx) = unbounded();
    let (input_tx, input_rx) = bounded::<AudioBlock>(BLOCK_QUEUE_CAPACITY);
    let (output_tx, output_rx) = bounded::<AudioBlock>(BLOCK_QUEUE_CAPACITY);

    let stats = SessionStats::new();
    let thread_stats = stats.clone();

    std::thread::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            processing_loop(
                pipeline,
                command_consumer,
                input_rx,
                output_tx,
                stop_rx,
                thread_stats,
            );
        }));
        if result.is_err() {
            log::error!("processing thread panicked; session is dead until restarted");
        }
    });

    let mut guard = ENGINE.lock();
    *guard = Some(EngineState {
        command_producer,
        stop_sender: stop_tx,
        input_sender: input_tx,
        output_receiver: output_rx,
        stats,
        sample_rate,
    });

    log::info!("denoise session started at {} Hz", sample_rate);
    Ok(())
}

/// Stop the active session, if any. The processing thread finishes its
/// in-flight block and exits.
pub fn stop_session() {
    let mut guard = ENGINE.lock();
    if let Some(state) = guard.take() {
        let _ = state.stop_sender.send(());
        log::info!("denoise session stopped");
    }
}

pub fn is_session_active() -> bool {
    ENGINE.lock().is_some()
}

pub fn session_sample_rate() -> Option<u32> {
    ENGINE.lock().as_ref().map(|s| s.sample_rate)
}

/// (sanitized_samples, frames_processed, blocks_dropped) of the live session.
pub fn session_stats() -> Option<(u64, u64, u64)> {
    ENGINE.lock().as_ref().map(|s| {
        (
            s.stats.sanitized_samples.load(Ordering::Relaxed),
            s.stats.frames_processed.load(Ordering::Relaxed),
            s.stats.blocks_dropped.load(Ordering::Relaxed),
        )
    })
}

/// Submit a block for processing. Returns false when no session is active
/// or the input queue is full; the caller decides whether to retry or drop.
pub fn push_block(block: AudioBlock) -> bool {
    let guard = ENGINE.lock();
    match guard.as_ref() {
        Some(state) => state.input_sender.try_send(block).is_ok(),
        None => false,
    }
}

/// Fetch the next processed block, if one is ready. Blocks come back in
/// submission order.
pub fn pull_block() -> Option<AudioBlock> {
    let guard = ENGINE.lock();
    guard
        .as_ref()
        .and_then(|state| state.output_receiver.try_recv().ok())
}

pub fn set_noise_reduction(value: f32) {
    send_command(Command::SetNoiseReduction(value));
}

pub fn reset_session() {
    send_command(Command::Reset);
}

pub fn set_bypass(bypass: bool) {
    send_command(Command::SetBypass(bypass));
}

pub fn configure(update: ConfigUpdate) {
    send_command(Command::Configure(update));
}

/// Accept a partial configuration as JSON, the shape the control surface
/// ships, e.g. `{"noise_reduction": 0.7, "window": "linear"}`.
pub fn configure_json(json: &str) -> anyhow::Result<()> {
    let update: ConfigUpdate =
        serde_json::from_str(json).context("invalid configuration JSON")?;
    send_command(Command::Configure(update));
    Ok(())
}

fn send_command(command: Command) {
    let mut guard = ENGINE.lock();
    if let Some(state) = guard.as_mut() {
        if state.command_producer.try_push(command).is_err() {
            log::warn!("command queue full, command dropped");
        }
    }
}

fn processing_loop<C>(
    mut pipeline: DenoisePipeline,
    mut commands: C,
    input: Receiver<AudioBlock>,
    output: Sender<AudioBlock>,
    stop: Receiver<()>,
    stats: SessionStats,
) where
    C: Consumer<Item = Command>,
{
    let mut bypass = false;
    loop {
        while let Some(command) = commands.try_pop() {
            handle_command(command, &mut pipeline, &mut bypass);
        }
        if stop.try_recv().is_ok() {
            break;
        }

        match input.recv_timeout(Duration::from_millis(50)) {
            Ok(block) => {
                let result = if bypass {
                    Ok(block)
                } else {
                    pipeline.process(&block)
                };
                match result {
                    Ok(out) => {
                        let s = pipeline.stats();
                        stats
                            .sanitized_samples
                            .store(s.sanitized_samples, Ordering::Relaxed);
                        stats
                            .frames_processed
                            .store(s.frames_processed, Ordering::Relaxed);
                        if output.try_send(out).is_err() {
                            stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                            log::warn!("output queue full, dropping processed block");
                        }
                    }
                    Err(e) => log::error!("block rejected: {e}"),
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("processing thread exiting");
}

pub(crate) fn handle_command(command: Command, pipeline: &mut DenoisePipeline, bypass: &mut bool) {
    match command {
        Command::SetNoiseReduction(value) => {
            let update = ConfigUpdate {
                noise_reduction: Some(value),
                ..Default::default()
            };
            if let Err(e) = pipeline.configure(&update) {
                log::error!("noise reduction update rejected: {e}");
            }
        }
        Command::Configure(update) => {
            if let Err(e) = pipeline.configure(&update) {
                log::error!("configuration rejected: {e}");
            }
        }
        Command::Reset => {
            if let Err(e) = pipeline.reset() {
                log::error!("reset failed: {e}");
            }
        }
        Command::SetBypass(value) => *bypass = value,
    }
}
