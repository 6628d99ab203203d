/**
 * ============================================================================
 * RECORDING CONFIG MODULE
 * ============================================================================
 *
 * PURPOSE: Recorder configuration and its persistence
 *
 * FUNCTIONALITY:
 * - Defaults for capture cadence, audio format and encoder targets
 * - Validation of user-supplied values
 * - Load/save as JSON (defaults when no file exists)
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::types::{OutputFormat, StreamSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_FRAMERATE: u32 = 1;
pub const MAX_FRAMERATE: u32 = 60;
pub const MAX_VOLUME: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    // Target framerate for screen capture (fps)
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    // Microphone sample rate (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    // Requested microphone channel count (capped by the device)
    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default)]
    pub output_format: OutputFormat,

    // Gain applied to captured audio at finalization (1.0 = unchanged)
    #[serde(default = "default_volume")]
    pub volume: f32,

    // Draw a pointer indicator into frames when the source reports one
    #[serde(default = "default_show_cursor")]
    pub show_cursor: bool,

    // FFmpeg binary; resolved from PATH when absent
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    // Parent of the per-recorder scratch directory; system temp dir when absent
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            framerate: default_framerate(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            output_format: OutputFormat::default(),
            volume: default_volume(),
            show_cursor: default_show_cursor(),
            ffmpeg_path: None,
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            scratch_root: None,
        }
    }
}

fn default_framerate() -> u32 {
    30
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_volume() -> f32 {
    1.0
}

fn default_show_cursor() -> bool {
    true
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_video_bitrate() -> String {
    "5000k".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

impl RecorderConfig {
    pub fn stream_spec(&self, device_channels: Option<u16>) -> StreamSpec {
        let channels = match device_channels {
            Some(max) if max > 0 => self.channels.min(max),
            _ => self.channels,
        };
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.framerate < MIN_FRAMERATE || self.framerate > MAX_FRAMERATE {
            return Err(RecorderError::Config(format!(
                "Framerate must be between {} and {}",
                MIN_FRAMERATE, MAX_FRAMERATE
            )));
        }

        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(RecorderError::Config(
                "Sample rate must be between 8000 and 192000 Hz".to_string(),
            ));
        }

        if self.channels == 0 || self.channels > 8 {
            return Err(RecorderError::Config("Channels must be between 1 and 8".to_string()));
        }

        if !self.volume.is_finite() || self.volume < 0.0 || self.volume > MAX_VOLUME {
            return Err(RecorderError::Config(format!(
                "Volume must be between 0.0 and {:.1}",
                MAX_VOLUME
            )));
        }

        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(RecorderError::Config("Codec names must not be empty".to_string()));
        }

        Ok(())
    }

    // Check if config changes affect a session already in flight
    pub fn needs_session_restart(&self, other: &RecorderConfig) -> bool {
        self.framerate != other.framerate
            || self.sample_rate != other.sample_rate
            || self.channels != other.channels
            || self.show_cursor != other.show_cursor
            || self.output_format != other.output_format
    }
}

// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("syncrec").join("recorder_config.json"))
}

// Load configuration from disk
pub fn load_config(path: &Path) -> Result<RecorderConfig> {
    if !path.exists() {
        log::info!("No recorder config found at {:?}, using defaults", path);
        return Ok(RecorderConfig::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: RecorderConfig = serde_json::from_str(&contents)?;
    config.validate()?;

    log::info!("Loaded recorder config from {:?}", path);
    Ok(config)
}

// Save configuration to disk
pub fn save_config(path: &Path, config: &RecorderConfig) -> Result<()> {
    config.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = serde_json::to_string_pretty(config)?;
    std::fs::write(path, contents)?;

    log::info!("Saved recorder config to {:?}", path);
    Ok(())
}
