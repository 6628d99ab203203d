// Synthetic capture sources and an in-memory encoder for session tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use syncrec::recording::audio::{AudioInput, DataCallback, ErrorCallback, InputStream};
use syncrec::recording::capture::{ScreenProvider, ScreenSettings, ScreenSource};
use syncrec::recording::encoder::{EncodeParams, MediaEncoder};
use syncrec::recording::types::{AudioDeviceInfo, RawImage, StreamSpec, VideoFrame};
use syncrec::{CaptureSources, EncoderError, Recorder, RecorderConfig, RecorderError};

pub const SCREEN_WIDTH: u32 = 16;
pub const SCREEN_HEIGHT: u32 = 12;

// =============================================================================
// Screen
// =============================================================================

struct SyntheticScreen {
    grabs: u64,
    fail_after: Option<u64>,
    pointer: Option<(i32, i32)>,
}

impl ScreenSource for SyntheticScreen {
    fn grab(&mut self) -> syncrec::Result<RawImage> {
        self.grabs += 1;
        if let Some(limit) = self.fail_after {
            if self.grabs > limit {
                return Err(RecorderError::Device("synthetic display disconnected".to_string()));
            }
        }
        Ok(RawImage::solid(SCREEN_WIDTH, SCREEN_HEIGHT, [(self.grabs % 256) as u8, 10, 20]))
    }

    fn pointer_position(&mut self) -> Option<(i32, i32)> {
        self.pointer
    }
}

#[derive(Default)]
pub struct SyntheticScreenProvider {
    pub fail_after: Option<u64>,
    pub fail_open: bool,
    pub pointer: Option<(i32, i32)>,
}

impl ScreenProvider for SyntheticScreenProvider {
    fn open(&self, _settings: &ScreenSettings) -> syncrec::Result<Box<dyn ScreenSource>> {
        if self.fail_open {
            return Err(RecorderError::Device("synthetic display missing".to_string()));
        }
        Ok(Box::new(SyntheticScreen {
            grabs: 0,
            fail_after: self.fail_after,
            pointer: self.pointer,
        }))
    }
}

// =============================================================================
// Microphone
// =============================================================================

// Constant-level input delivering 10 ms callbacks in real time
pub struct SyntheticMic {
    pub index: usize,
    pub channels: u16,
    pub level: f32,
    pub fail_after: Option<u32>,
}

impl SyntheticMic {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            channels: 2,
            level: 0.25,
            fail_after: None,
        }
    }
}

struct SyntheticStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputStream for SyntheticStream {}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioInput for SyntheticMic {
    fn devices(&self) -> syncrec::Result<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            index: self.index,
            name: "Synthetic Mic".to_string(),
            channels: self.channels,
        }])
    }

    fn open(
        &self,
        device: usize,
        spec: StreamSpec,
        mut on_data: DataCallback,
        mut on_error: ErrorCallback,
    ) -> syncrec::Result<Box<dyn InputStream>> {
        if device != self.index {
            return Err(RecorderError::Device(format!("Audio device {} not found", device)));
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let level = self.level;
        let fail_after = self.fail_after;

        let handle = thread::spawn(move || {
            let period = Duration::from_millis(10);
            let frames = (spec.sample_rate / 100) as usize;
            let buf = vec![level; frames * spec.channels as usize];
            let start = Instant::now();
            let mut k: u32 = 0;

            while flag.load(Ordering::SeqCst) {
                k += 1;
                let due = start + period * k;
                let now = Instant::now();
                if due > now {
                    thread::sleep(due - now);
                }
                if fail_after == Some(k) {
                    on_error("synthetic mic unplugged".to_string());
                    break;
                }
                on_data(&buf);
            }
        });

        Ok(Box::new(SyntheticStream {
            running,
            handle: Some(handle),
        }))
    }
}

// =============================================================================
// Encoder
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct EncoderLog {
    pub frame_timestamps: Vec<f64>,
    pub frame_sizes: Vec<(u32, u32)>,
    pub video_bytes: Vec<u8>,
    pub mux_calls: usize,
    pub audio_samples: Vec<f32>,
    pub audio_channels: u16,
}

// Writes small marker files instead of real media
#[derive(Debug, Default)]
pub struct RecordingEncoder {
    pub fail_encode: bool,
    pub fail_mux: bool,
    log: Mutex<EncoderLog>,
}

impl RecordingEncoder {
    pub fn failing_mux() -> Self {
        Self {
            fail_mux: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> EncoderLog {
        self.log.lock().unwrap().clone()
    }
}

impl MediaEncoder for RecordingEncoder {
    fn encode_video(
        &self,
        frames: &[VideoFrame],
        params: EncodeParams,
        output: &Path,
    ) -> Result<(), EncoderError> {
        if self.fail_encode {
            return Err(EncoderError::new(Some(1), "synthetic encode failure"));
        }

        let mut bytes = format!("{} {} {}\n", params.format.fourcc(), params.framerate, frames.len())
            .into_bytes();
        for frame in frames {
            bytes.push(frame.pixels[0]);
        }
        std::fs::write(output, &bytes).map_err(|e| EncoderError::new(None, e.to_string()))?;

        let mut log = self.log.lock().unwrap();
        log.frame_timestamps = frames.iter().map(|f| f.timestamp).collect();
        log.frame_sizes = frames.iter().map(|f| (f.width, f.height)).collect();
        log.video_bytes = bytes;
        Ok(())
    }

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        _params: EncodeParams,
        output: &Path,
    ) -> Result<PathBuf, EncoderError> {
        let mut reader =
            hound::WavReader::open(audio).map_err(|e| EncoderError::new(None, e.to_string()))?;
        let channels = reader.spec().channels;
        let samples: Vec<f32> = reader.samples::<f32>().filter_map(|s| s.ok()).collect();

        {
            let mut log = self.log.lock().unwrap();
            log.mux_calls += 1;
            log.audio_samples = samples;
            log.audio_channels = channels;
        }

        if self.fail_mux {
            return Err(EncoderError::new(
                Some(1),
                "Unknown encoder 'libx264'\nError selecting an encoder",
            ));
        }

        let mut bytes = std::fs::read(video).map_err(|e| EncoderError::new(None, e.to_string()))?;
        bytes.extend_from_slice(b"+audio");
        std::fs::write(output, bytes).map_err(|e| EncoderError::new(None, e.to_string()))?;
        Ok(output.to_path_buf())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub recorder: Recorder,
    pub encoder: Arc<RecordingEncoder>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn test_config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        framerate: 30,
        scratch_root: Some(dir.join("scratch")),
        ..RecorderConfig::default()
    }
}

pub fn harness_with(
    screen: SyntheticScreenProvider,
    mic: SyntheticMic,
    encoder: RecordingEncoder,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(encoder);
    let sources = CaptureSources {
        screen: Arc::new(screen),
        audio: Arc::new(mic),
    };
    let recorder = Recorder::new(test_config(dir.path()), encoder.clone(), sources).unwrap();
    Harness {
        recorder,
        encoder,
        dir,
    }
}

pub fn harness(mic_index: usize) -> Harness {
    harness_with(
        SyntheticScreenProvider::default(),
        SyntheticMic::new(mic_index),
        RecordingEncoder::default(),
    )
}
