/**
 * ============================================================================
 * RECORDING TYPES MODULE
 * ============================================================================
 *
 * PURPOSE: Data structures shared by the capture, sync and finalize stages
 *
 * TYPES:
 * - SessionPhase: Session state machine states
 * - Rect: Optional recording area
 * - RawImage / VideoFrame: Screen grabs and timestamped frames
 * - AudioChunk: Timestamped device callback buffers
 * - SyncSample / StreamKind: Ring-buffer entries for drift detection
 * - PauseWindow: One pause, accumulated on resume
 * - OutputFormat: Container choice for the finished file
 * - AudioDeviceInfo / StreamSpec: Externally enumerated input devices
 * - SessionRequest / SessionReport / RecordingStatus: Facade inputs and outputs
 *
 * ============================================================================
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Session lifecycle: Idle -> Recording <-> Paused -> Stopping -> Finalizing -> Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Recording,
    Paused,
    Stopping,
    Finalizing,
}

impl SessionPhase {
    // Recording or Paused: producers are alive
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Recording | SessionPhase::Paused)
    }
}

// Recording area in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    // Parse "x,y,w,h"
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [x, y, w, h] if *w > 0 && *h > 0 => Some(Self::new(*x, *y, *w, *h)),
            _ => None,
        }
    }
}

// Full-screen grab, packed RGB (3 bytes per pixel)
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            pixels.extend_from_slice(&rgb);
        }
        Self { width, height, pixels }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    // Seconds since baseline minus accumulated pause time
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub timestamp: f64,

    // Interleaved samples, `frame_count * channels` long
    pub samples: Vec<f32>,
    pub frame_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSample {
    pub kind: StreamKind,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseWindow {
    // Raw seconds since baseline at which the pause began
    pub started_at: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Avi,
    Mov,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
        }
    }

    // Codec tag of the intermediate video-only asset
    pub fn fourcc(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4v",
            OutputFormat::Avi => "XVID",
            OutputFormat::Mov => "MJPG",
        }
    }

    // FFmpeg encoder producing that codec tag
    pub fn intermediate_codec(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 | OutputFormat::Avi => "mpeg4",
            OutputFormat::Mov => "mjpeg",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Some(OutputFormat::Mp4),
            "avi" => Some(OutputFormat::Avi),
            "mov" => Some(OutputFormat::Mov),
            _ => None,
        }
    }

    // Append the format extension if the path does not already carry it
    pub fn apply_extension(&self, path: PathBuf) -> PathBuf {
        let has_ext = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false);
        if has_ext {
            path
        } else {
            let mut s = path.into_os_string();
            s.push(".");
            s.push(self.extension());
            PathBuf::from(s)
        }
    }
}

// Input device as supplied by the enumeration layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub index: usize,
    pub name: String,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

// Parameters for one recording session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub output: PathBuf,
    pub record_audio: bool,
    pub device_index: Option<usize>,
}

impl SessionRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            record_audio: true,
            device_index: None,
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.record_audio = false;
        self.device_index = None;
        self
    }

    pub fn with_device(mut self, index: usize) -> Self {
        self.record_audio = true;
        self.device_index = Some(index);
        self
    }
}

// Summary of a finalized session (also written as a JSON sidecar)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub output: PathBuf,

    // ISO 8601 wall-clock start and end
    pub start_time: String,
    pub end_time: String,

    pub framerate: u32,
    pub frame_count: u64,
    pub achieved_fps: Option<f64>,
    pub video_duration_seconds: f64,

    pub audio_muxed: bool,
    pub audio_sample_count: u64,
    pub audio_duration_seconds: f64,

    pub pauses: Vec<PauseWindow>,
    pub sync_adjustments: Vec<f64>,
}

// Live status for a UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub phase: SessionPhase,
    pub elapsed_seconds: f64,
    pub frame_count: u64,
    pub sample_count: u64,
    pub pause_count: usize,
    pub audio_level: f32,
    pub scratch_bytes: u64,
    pub failure: Option<String>,
}
