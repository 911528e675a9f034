//! Capture session lifecycle: device streams in, encoded WAV chunks out.
//!
//! The session owns the cpal streams on the caller's thread (streams are not
//! `Send`), while a pump thread does everything else: pairing system and mic
//! blocks, conditioning, mixing, segmentation, resampling, and encoding.
//! Device callbacks only downmix and re-block; they never touch the pipeline.

use super::dispatch::BlockDispatcher;
use super::encode::{encode_wav, EncodedChunk};
use super::level::{spawn_monitor, AnalysisSnapshot, LevelHandle};
use super::mixer::{downmix_block, mix_stereo, MicConditioner, MixerGains};
use super::resample::{convert_block_rate, resample_frames};
use super::segment::{SegmentationEngine, SegmentationPolicy};
use super::TARGET_RATE;
use crate::error::{classify_backend_message, CaptureError};
use crate::log_debug;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle states. `Stopped` is terminal; a new capture means a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Paused,
    Stopped,
}

/// Plumbing knobs, fixed for the life of a session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Frames per block handed to the pump; the pipeline's unit of work.
    pub block_frames: usize,
    /// Bounded capacity of each source-to-pump channel, in blocks.
    pub channel_capacity: usize,
    /// How often the level monitor republishes, in milliseconds.
    pub level_cadence_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_frames: 4096,
            channel_capacity: 64,
            level_cadence_ms: 16,
        }
    }
}

/// One capture: system source always on, microphone lazily attached, encoded
/// chunks pushed into the sender the caller supplied.
///
/// Dropping the session stops it. Frames accumulated but not yet flushed when
/// the session stops are discarded, never emitted as a partial chunk.
pub struct CaptureSession {
    config: CaptureConfig,
    policy: SegmentationPolicy,
    chunk_tx: Sender<EncodedChunk>,
    state: SessionState,
    gains: MixerGains,
    level: LevelHandle,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    system_dropped: Arc<AtomicUsize>,
    mic_dropped: Arc<AtomicUsize>,
    mic_rate: Arc<AtomicU32>,
    native_rate: u32,
    mic_tx: Option<Sender<Vec<f32>>>,
    system_stream: Option<cpal::Stream>,
    mic_stream: Option<cpal::Stream>,
    pump: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(
        config: CaptureConfig,
        policy: SegmentationPolicy,
        chunk_tx: Sender<EncodedChunk>,
    ) -> Self {
        Self {
            config,
            policy,
            chunk_tx,
            state: SessionState::Idle,
            gains: MixerGains::new(),
            level: LevelHandle::new(),
            paused: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            system_dropped: Arc::new(AtomicUsize::new(0)),
            mic_dropped: Arc::new(AtomicUsize::new(0)),
            mic_rate: Arc::new(AtomicU32::new(0)),
            native_rate: 0,
            mic_tx: None,
            system_stream: None,
            mic_stream: None,
            pump: None,
            monitor: None,
        }
    }

    /// Capture source names the host exposes, for a CLI selector. Loopback
    /// and monitor devices show up here alongside physical microphones.
    pub fn list_sources() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| classify_backend_message(&err.to_string()))?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open the system source, start its stream, and spin up the pump and
    /// level monitor. `source_id` selects a named input device; `None` takes
    /// the host default.
    pub fn start(&mut self, source_id: Option<&str>) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::ResourceExhausted(
                "session already started".to_string(),
            ));
        }

        let device = find_source(source_id)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown source".to_string());
        let default_config = device
            .default_input_config()
            .map_err(|err| map_config_error(&device_name, err))?;
        let format = default_config.sample_format();
        let stream_config: StreamConfig = default_config.into();
        let native_rate = stream_config.sample_rate.0;
        self.native_rate = native_rate;
        let channels = usize::from(stream_config.channels.max(1));

        log_debug(&format!(
            "system source '{device_name}': format={format:?} rate={native_rate}Hz channels={channels}"
        ));
        tracing::info!(source = %device_name, rate = native_rate, channels, "capture_start");

        let (system_tx, system_rx) = bounded::<Vec<f32>>(self.config.channel_capacity.max(1));
        let (mic_tx, mic_rx) = bounded::<Vec<f32>>(self.config.channel_capacity.max(1));
        self.mic_tx = Some(mic_tx);

        let stream = build_source_stream(
            &device,
            &stream_config,
            format,
            self.config.block_frames,
            system_tx,
            self.system_dropped.clone(),
        )?;
        stream
            .play()
            .map_err(|err| map_play_error(&device_name, err))?;
        self.system_stream = Some(stream);

        let snapshot = AnalysisSnapshot::new();
        self.monitor = Some(spawn_monitor(
            snapshot.clone(),
            self.level.clone(),
            native_rate,
            self.config.level_cadence_ms,
            self.stop.clone(),
        ));

        let pump = PumpContext {
            system_rx,
            mic_rx,
            mic_rate: self.mic_rate.clone(),
            gains: self.gains.clone(),
            paused: self.paused.clone(),
            stop: self.stop.clone(),
            snapshot,
            chunk_tx: self.chunk_tx.clone(),
            policy: self.policy.clone(),
            native_rate,
            block_frames: self.config.block_frames.max(1),
        };
        self.pump = Some(std::thread::spawn(move || run_pump(pump)));

        self.state = SessionState::Capturing;
        Ok(())
    }

    /// Attach or silence the microphone. The device opens lazily on first
    /// enable; afterwards toggling only moves the gain, so the stream stays
    /// warm and re-enabling is instant.
    pub fn set_mic_enabled(&mut self, enabled: bool, mic_id: Option<&str>) -> Result<(), CaptureError> {
        if !matches!(self.state, SessionState::Capturing | SessionState::Paused) {
            return Err(CaptureError::ResourceExhausted(
                "session is not capturing".to_string(),
            ));
        }
        if enabled && self.mic_stream.is_none() {
            let sender = self
                .mic_tx
                .clone()
                .ok_or_else(|| CaptureError::ResourceExhausted("mic channel closed".to_string()))?;
            let device = find_source(mic_id)?;
            let device_name = device
                .name()
                .unwrap_or_else(|_| "unknown microphone".to_string());
            let default_config = device
                .default_input_config()
                .map_err(|err| map_config_error(&device_name, err))?;
            let format = default_config.sample_format();
            let stream_config: StreamConfig = default_config.into();
            self.mic_rate
                .store(stream_config.sample_rate.0, Ordering::Relaxed);
            let channels = usize::from(stream_config.channels.max(1));
            log_debug(&format!(
                "mic source '{device_name}': format={format:?} rate={}Hz channels={channels}",
                stream_config.sample_rate.0
            ));
            // Mic blocks are re-blocked at the mic's own rate; the pump
            // aligns them to the system rate when pairing.
            let mic_block = scale_block_frames(
                self.config.block_frames,
                self.native_rate,
                stream_config.sample_rate.0,
            );
            let stream = build_source_stream(
                &device,
                &stream_config,
                format,
                mic_block,
                sender,
                self.mic_dropped.clone(),
            )?;
            stream
                .play()
                .map_err(|err| map_play_error(&device_name, err))?;
            self.mic_stream = Some(stream);
        }
        self.gains.mic.set(if enabled { 1.0 } else { 0.0 });
        Ok(())
    }

    /// Suspend or resume emission. Wall-clock time keeps running while
    /// paused, so a pause long enough to cross the segment limits flushes on
    /// the first block after resume.
    pub fn set_paused(&mut self, paused: bool) {
        match (self.state, paused) {
            (SessionState::Capturing, true) => {
                self.paused.store(true, Ordering::Relaxed);
                self.state = SessionState::Paused;
            }
            (SessionState::Paused, false) => {
                self.paused.store(false, Ordering::Relaxed);
                self.state = SessionState::Capturing;
            }
            _ => {}
        }
    }

    /// Tear everything down. Idempotent; pending unflushed audio is dropped.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.stop.store(true, Ordering::Relaxed);
        if let Some(stream) = self.system_stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause system stream: {err}"));
            }
            drop(stream);
        }
        if let Some(stream) = self.mic_stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause mic stream: {err}"));
            }
            drop(stream);
        }
        self.mic_tx = None;
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
        let system_dropped = self.system_dropped.load(Ordering::Relaxed);
        let mic_dropped = self.mic_dropped.load(Ordering::Relaxed);
        if system_dropped > 0 || mic_dropped > 0 {
            log_debug(&format!(
                "capture backpressure: dropped {system_dropped} system / {mic_dropped} mic blocks"
            ));
        }
        self.state = SessionState::Stopped;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }

    pub fn gains(&self) -> MixerGains {
        self.gains.clone()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PumpContext {
    system_rx: Receiver<Vec<f32>>,
    mic_rx: Receiver<Vec<f32>>,
    mic_rate: Arc<AtomicU32>,
    gains: MixerGains,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    snapshot: AnalysisSnapshot,
    chunk_tx: Sender<EncodedChunk>,
    policy: SegmentationPolicy,
    native_rate: u32,
    block_frames: usize,
}

/// The pump loop. One iteration per system block: pair with the freshest mic
/// block, condition, mix, meter, segment, and emit any flushed chunk.
fn run_pump(ctx: PumpContext) {
    let mut engine = SegmentationEngine::new(ctx.policy, ctx.native_rate, Instant::now());
    let mut conditioner = MicConditioner::new(ctx.native_rate);
    let mut stereo = Vec::with_capacity(ctx.block_frames * 2);
    let mut mono = Vec::with_capacity(ctx.block_frames);
    let wait = Duration::from_millis(50);

    loop {
        if ctx.stop.load(Ordering::Relaxed) {
            break;
        }
        let system_block = match ctx.system_rx.recv_timeout(wait) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if system_block.len() != ctx.block_frames {
            log_debug(&format!(
                "discarding malformed system block of {} samples",
                system_block.len()
            ));
            continue;
        }

        // Keep only the freshest mic block; stale ones would skew alignment
        // worse than a one-block gap does.
        let mut mic_block = None;
        while let Ok(block) = ctx.mic_rx.try_recv() {
            mic_block = Some(block);
        }
        let mut mic_aligned = match mic_block {
            Some(block) => convert_block_rate(
                block,
                ctx.mic_rate.load(Ordering::Relaxed),
                ctx.native_rate,
                ctx.block_frames,
            ),
            None => vec![0.0; ctx.block_frames],
        };
        conditioner.process_block(&mut mic_aligned);

        mix_stereo(
            &system_block,
            &mic_aligned,
            ctx.gains.system.get(),
            ctx.gains.mic.get(),
            &mut stereo,
        );

        if ctx.paused.load(Ordering::Relaxed) {
            // Nothing accumulates while paused, but the engine's wall clock
            // keeps running so limits crossed during the pause take effect
            // on the first block after resume.
            ctx.snapshot.publish_silence();
            continue;
        }

        downmix_block(&stereo, &mut mono);
        ctx.snapshot.publish(&mono);

        if let Some(segment) = engine.push_block(&stereo, Instant::now()) {
            let resampled = resample_frames(&segment.frames, segment.native_rate, TARGET_RATE);
            let chunk = encode_wav(&resampled, TARGET_RATE);
            log_debug(&format!(
                "flushed segment: {} native frames -> {} target frames",
                segment.frame_count, chunk.frame_count
            ));
            tracing::info!(
                native_frames = segment.frame_count,
                target_frames = chunk.frame_count,
                bytes = chunk.data.len(),
                "segment_flush"
            );
            if ctx.chunk_tx.send(chunk).is_err() {
                break;
            }
        }
    }

    if engine.pending_frames() > 0 {
        log_debug(&format!(
            "dropping {} pending frames at session stop",
            engine.pending_frames()
        ));
    }
}

fn find_source(source_id: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match source_id {
        Some(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|err| classify_backend_message(&err.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(name.to_string()))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("default input".to_string())),
    }
}

/// Scale a block size from one sample rate to another so both sources deliver
/// blocks that span roughly the same wall-clock duration.
pub(super) fn scale_block_frames(block_frames: usize, reference_rate: u32, rate: u32) -> usize {
    if reference_rate == 0 || rate == 0 || reference_rate == rate {
        return block_frames.max(1);
    }
    ((block_frames as u64 * u64::from(rate)) / u64::from(reference_rate)).max(1) as usize
}

/// Build an input stream whose callback downmixes to mono and re-blocks into
/// the pump channel. Every supported sample format is normalized to f32 at
/// the edge so the rest of the pipeline stays format-agnostic.
fn build_source_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    block_frames: usize,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream, CaptureError> {
    let channels = usize::from(config.channels.max(1));
    let dispatcher = Arc::new(Mutex::new(BlockDispatcher::new(
        block_frames,
        sender,
        dropped.clone(),
    )));
    let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let stream = match format {
        SampleFormat::F32 => {
            let dispatcher = dispatcher.clone();
            let dropped = dropped.clone();
            device.build_input_stream(
                config,
                move |data: &[f32], _| {
                    if let Ok(mut pump) = dispatcher.try_lock() {
                        pump.push(data, channels, |sample| sample);
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let dispatcher = dispatcher.clone();
            let dropped = dropped.clone();
            device.build_input_stream(
                config,
                move |data: &[i16], _| {
                    if let Ok(mut pump) = dispatcher.try_lock() {
                        pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let dispatcher = dispatcher.clone();
            let dropped = dropped.clone();
            device.build_input_stream(
                config,
                move |data: &[u16], _| {
                    if let Ok(mut pump) = dispatcher.try_lock() {
                        pump.push(data, channels, |sample| {
                            (sample as f32 - 32_768.0) / 32_768.0
                        });
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(CaptureError::ResourceExhausted(format!(
                "unsupported sample format {other:?} on '{device_name}'"
            )))
        }
    };

    stream.map_err(|err| map_build_error(&device_name, err))
}

fn map_build_error(device_name: &str, err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(device_name.to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
        other => CaptureError::ResourceExhausted(format!("{device_name}: {other}")),
    }
}

fn map_config_error(device_name: &str, err: cpal::DefaultStreamConfigError) -> CaptureError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(device_name.to_string())
        }
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
        other => CaptureError::ResourceExhausted(format!("{device_name}: {other}")),
    }
}

fn map_play_error(device_name: &str, err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(device_name.to_string())
        }
        cpal::PlayStreamError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
    }
}
