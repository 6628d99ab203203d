/**
 * ============================================================================
 * AUDIO CAPTURE MODULE
 * ============================================================================
 *
 * PURPOSE: Callback-driven microphone producer
 *
 * FLOW:
 * - The producer thread waits on the start gate (video baseline), then opens
 *   the input stream so both producers share one time origin
 * - Each device callback, while Recording, is timestamped
 *   (now - baseline - pause_accumulator), pushed to the sample buffer, fed to
 *   the sync monitor and counted; while Paused or Stopping it is discarded
 * - Stream errors are fatal to the session
 *
 * The cpal stream is not Send; it is opened, held and dropped on the producer
 * thread. AudioInput is the seam between the producer and the host API.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::device::DeviceLease;
use crate::recording::producer::{Producer, ProducerStats, SessionContext, join_producer};
use crate::recording::types::{AudioChunk, AudioDeviceInfo, StreamKind, StreamSpec, SyncSample};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// How often the idle producer thread checks for stream errors
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Interleaved f32 samples of one device callback
pub type DataCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

// Live device stream; dropping it closes the device
pub trait InputStream {}

impl InputStream for cpal::Stream {}

pub trait AudioInput: Send + Sync {
    fn devices(&self) -> Result<Vec<AudioDeviceInfo>>;

    fn default_device(&self) -> Option<usize> {
        self.devices().ok()?.first().map(|d| d.index)
    }

    fn open(
        &self,
        device: usize,
        spec: StreamSpec,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn InputStream>>;
}

// =============================================================================
// Level Meter
// =============================================================================

// Peak absolute amplitude of the latest callback, stored as f32 bits
#[derive(Debug, Default)]
pub struct LevelMeter {
    peak: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, samples: &[f32]) {
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        self.peak.store(peak.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.peak.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

// =============================================================================
// Producer
// =============================================================================

pub struct AudioCapture {
    input: Arc<dyn AudioInput>,
    device: usize,
    spec: StreamSpec,
    lease: Option<DeviceLease>,
    handle: Option<JoinHandle<ProducerStats>>,
}

impl AudioCapture {
    pub fn new(input: Arc<dyn AudioInput>, device: usize, spec: StreamSpec) -> Self {
        Self {
            input,
            device,
            spec,
            lease: None,
            handle: None,
        }
    }
}

impl Producer for AudioCapture {
    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn start(&mut self, ctx: Arc<SessionContext>) -> Result<()> {
        if self.handle.is_some() {
            return Err(RecorderError::State("Audio producer already started".to_string()));
        }

        // Busy devices fail here, before any thread exists
        let lease = DeviceLease::acquire(self.device)?;

        let input = self.input.clone();
        let device = self.device;
        let spec = self.spec;

        let handle = thread::Builder::new()
            .name("syncrec-audio".to_string())
            .spawn(move || match run_audio_stream(input.as_ref(), device, spec, &ctx) {
                Ok(stats) => {
                    log::info!(
                        "Audio producer finished: {} sample frames, last timestamp {:.3}s",
                        stats.units,
                        stats.last_timestamp
                    );
                    stats
                }
                Err(e) => {
                    ctx.coordinator.fail(e);
                    ProducerStats {
                        kind: StreamKind::Audio,
                        units: ctx.coordinator.sample_count(),
                        last_timestamp: ctx.sync.last_audio(),
                    }
                }
            })?;

        self.lease = Some(lease);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<ProducerStats> {
        let stats = join_producer(StreamKind::Audio, self.handle.take());
        self.lease = None;
        stats
    }
}

// Producer thread body: gate, open, idle until stop, close
fn run_audio_stream(
    input: &dyn AudioInput,
    device: usize,
    spec: StreamSpec,
    ctx: &Arc<SessionContext>,
) -> Result<ProducerStats> {
    if ctx.coordinator.wait_for_baseline().is_none() {
        log::info!("Session stopped before the audio producer started");
        return Ok(ProducerStats::empty(StreamKind::Audio));
    }

    let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let on_data: DataCallback = {
        let ctx = ctx.clone();
        let channels = spec.channels;
        Box::new(move |data: &[f32]| {
            push_audio(&ctx, data, channels, Instant::now());
        })
    };

    let on_error: ErrorCallback = {
        let slot = stream_error.clone();
        Box::new(move |msg: String| {
            log::error!("Audio stream error: {}", msg);
            let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.get_or_insert(msg);
        })
    };

    let stream = input.open(device, spec, on_data, on_error)?;
    log::info!(
        "Audio producer started on device {} ({} Hz, {} ch)",
        device,
        spec.sample_rate,
        spec.channels
    );

    while !ctx.coordinator.wait_for_stop(STREAM_POLL_INTERVAL) {
        let failed = stream_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(msg) = failed {
            drop(stream);
            return Err(RecorderError::Device(format!(
                "Audio device {} failed: {}",
                device, msg
            )));
        }
    }

    drop(stream);

    Ok(ProducerStats {
        kind: StreamKind::Audio,
        units: ctx.coordinator.sample_count(),
        last_timestamp: ctx.sync.last_audio(),
    })
}

// One device callback; returns the running sample-frame total when accepted
pub(crate) fn push_audio(
    ctx: &SessionContext,
    data: &[f32],
    channels: u16,
    now: Instant,
) -> Option<u64> {
    let frame_count = data.len() / channels.max(1) as usize;
    if frame_count == 0 {
        return None;
    }

    let timestamp = ctx.coordinator.timestamp_at(now)?;

    ctx.meter.update(data);
    ctx.samples.push(AudioChunk {
        timestamp,
        samples: data.to_vec(),
        frame_count,
    });
    ctx.sync.record(
        SyncSample {
            kind: StreamKind::Audio,
            timestamp,
        },
        &ctx.frames,
    );

    Some(ctx.coordinator.record_audio_frames(frame_count as u64))
}

// =============================================================================
// Self-test
// =============================================================================

// Standalone microphone check: a stream that only drives a level meter
pub struct AudioSelfTest {
    meter: Arc<LevelMeter>,
    error: Arc<Mutex<Option<String>>>,
    stream: Option<Box<dyn InputStream>>,
    lease: Option<DeviceLease>,
}

impl AudioSelfTest {
    pub fn start(input: &dyn AudioInput, device: usize, spec: StreamSpec) -> Result<Self> {
        let lease = DeviceLease::acquire(device)?;

        let meter = Arc::new(LevelMeter::new());
        let error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let on_data: DataCallback = {
            let meter = meter.clone();
            Box::new(move |data: &[f32]| meter.update(data))
        };
        let on_error: ErrorCallback = {
            let error = error.clone();
            Box::new(move |msg: String| {
                log::warn!("Self-test stream error: {}", msg);
                *error.lock().unwrap_or_else(|e| e.into_inner()) = Some(msg);
            })
        };

        let stream = input.open(device, spec, on_data, on_error)?;
        log::info!("Audio self-test started on device {}", device);

        Ok(Self {
            meter,
            error,
            stream: Some(stream),
            lease: Some(lease),
        })
    }

    pub fn level(&self) -> f32 {
        self.meter.level()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stop(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // Stream first, then the device lease
        if self.stream.take().is_some() {
            log::info!("Audio self-test stopped");
        }
        self.lease = None;
    }
}

impl Drop for AudioSelfTest {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// cpal Input
// =============================================================================

// Enumerate input devices in host order; the index is the device handle
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| RecorderError::Device(format!("Failed to enumerate input devices: {}", e)))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let channels = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            AudioDeviceInfo {
                index,
                name,
                channels,
            }
        })
        .collect())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl CpalInput {
    fn device_at(index: usize) -> Result<cpal::Device> {
        cpal::default_host()
            .input_devices()
            .map_err(|e| RecorderError::Device(format!("Failed to enumerate input devices: {}", e)))?
            .nth(index)
            .ok_or_else(|| RecorderError::Device(format!("Audio device {} not found", index)))
    }

    // A supported config for the requested rate and channels; f32 preferred, then i16, then u16
    fn pick_config(device: &cpal::Device, spec: StreamSpec) -> Result<(StreamConfig, SampleFormat)> {
        let candidates: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| RecorderError::Device(format!("Failed to query input configs: {}", e)))?
            .filter(|c| {
                c.channels() == spec.channels
                    && c.min_sample_rate().0 <= spec.sample_rate
                    && spec.sample_rate <= c.max_sample_rate().0
            })
            .collect();

        let chosen = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16]
            .iter()
            .find_map(|format| candidates.iter().find(|c| c.sample_format() == *format))
            .cloned()
            .ok_or_else(|| {
                RecorderError::Device(format!(
                    "Device does not support {} Hz with {} channel(s)",
                    spec.sample_rate, spec.channels
                ))
            })?;

        let config = chosen.with_sample_rate(cpal::SampleRate(spec.sample_rate));
        let format = config.sample_format();
        Ok((config.into(), format))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut on_data: DataCallback,
    mut on_error: ErrorCallback,
) -> Result<cpal::Stream>
where
    T: Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let mut converted: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&s| f32::from_sample(s)));
                on_data(&converted);
            },
            move |err| on_error(err.to_string()),
            None,
        )
        .map_err(|e| RecorderError::Device(format!("Failed to build input stream: {}", e)))
}

impl AudioInput for CpalInput {
    fn devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        list_input_devices()
    }

    fn default_device(&self) -> Option<usize> {
        let default_name = cpal::default_host().default_input_device()?.name().ok()?;
        self.devices()
            .ok()?
            .into_iter()
            .find(|d| d.name == default_name)
            .map(|d| d.index)
    }

    fn open(
        &self,
        device: usize,
        spec: StreamSpec,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn InputStream>> {
        let dev = Self::device_at(device)?;
        let (config, format) = Self::pick_config(&dev, spec)?;

        log::info!(
            "Microphone Device: {} ({:?}, {} Hz, {} ch)",
            dev.name().unwrap_or_else(|_| "Unknown".to_string()),
            format,
            spec.sample_rate,
            spec.channels
        );

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&dev, &config, on_data, on_error)?,
            SampleFormat::I16 => build_stream::<i16>(&dev, &config, on_data, on_error)?,
            SampleFormat::U16 => build_stream::<u16>(&dev, &config, on_data, on_error)?,
            other => {
                return Err(RecorderError::Device(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| RecorderError::Device(format!("Failed to start input stream: {}", e)))?;

        Ok(Box::new(stream))
    }
}
