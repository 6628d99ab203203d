/**
 * ============================================================================
 * MEDIA ENCODER MODULE
 * ============================================================================
 *
 * PURPOSE: Boundary to the external media encoder (FFmpeg)
 *
 * OPERATIONS:
 * - encode_video: raw rgb24 frames piped to stdin -> video-only intermediate
 *   tagged with the output format's codec tag
 * - mux: intermediate video + WAV -> final container, re-encoded to the
 *   configured codecs/bitrates at constant frame rate
 *
 * stderr is always captured on a side thread; a failed run returns the exit
 * status with the complete diagnostic output.
 *
 * ============================================================================
 */

use crate::error::EncoderError;
use crate::recording::config::RecorderConfig;
use crate::recording::types::{OutputFormat, VideoFrame};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

// Session parameters both encoder steps need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub framerate: u32,
    pub format: OutputFormat,
}

pub trait MediaEncoder: Send + Sync {
    // Frames are in push order and share one size
    fn encode_video(
        &self,
        frames: &[VideoFrame],
        params: EncodeParams,
        output: &Path,
    ) -> Result<(), EncoderError>;

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        params: EncodeParams,
        output: &Path,
    ) -> Result<PathBuf, EncoderError>;
}

// =============================================================================
// Argument Builder
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum FfmpegJob {
    RawVideo { width: u32, height: u32 },
    Mux { video: PathBuf, audio: PathBuf },
}

#[derive(Debug, Clone)]
pub struct FfmpegArgs {
    job: FfmpegJob,
    framerate: u32,
    video_codec: String,
    audio_codec: String,
    video_bitrate: String,
    audio_bitrate: String,
    codec_tag: Option<String>,
    output: PathBuf,
}

impl FfmpegArgs {
    // rgb24 frames from stdin into a video-only file
    pub fn raw_video(width: u32, height: u32, output: impl Into<PathBuf>) -> Self {
        Self::with_job(FfmpegJob::RawVideo { width, height }, output.into())
    }

    // Video + audio inputs into the final container
    pub fn mux(video: impl Into<PathBuf>, audio: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self::with_job(
            FfmpegJob::Mux {
                video: video.into(),
                audio: audio.into(),
            },
            output.into(),
        )
    }

    fn with_job(job: FfmpegJob, output: PathBuf) -> Self {
        Self {
            job,
            framerate: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: "5000k".to_string(),
            audio_bitrate: "192k".to_string(),
            codec_tag: None,
            output,
        }
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    pub fn with_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    pub fn with_bitrates(mut self, video: impl Into<String>, audio: impl Into<String>) -> Self {
        self.video_bitrate = video.into();
        self.audio_bitrate = audio.into();
        self
    }

    pub fn with_codec_tag(mut self, tag: impl Into<String>) -> Self {
        self.codec_tag = Some(tag.into());
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string()];

        match &self.job {
            FfmpegJob::RawVideo { width, height } => {
                args.extend(vec![
                    "-f".to_string(), "rawvideo".to_string(),
                    "-pix_fmt".to_string(), "rgb24".to_string(),
                    "-s".to_string(), format!("{}x{}", width, height),
                    "-r".to_string(), self.framerate.to_string(),
                    "-i".to_string(), "pipe:0".to_string(),
                    "-c:v".to_string(), self.video_codec.clone(),
                    "-q:v".to_string(), "2".to_string(),
                ]);
                if let Some(tag) = &self.codec_tag {
                    args.push("-vtag".to_string());
                    args.push(tag.clone());
                }
            }
            FfmpegJob::Mux { video, audio } => {
                args.extend(vec![
                    "-i".to_string(), video.to_string_lossy().to_string(),
                    "-i".to_string(), audio.to_string_lossy().to_string(),
                    "-c:v".to_string(), self.video_codec.clone(),
                    "-c:a".to_string(), self.audio_codec.clone(),
                    "-b:v".to_string(), self.video_bitrate.clone(),
                    "-b:a".to_string(), self.audio_bitrate.clone(),
                    "-r".to_string(), self.framerate.to_string(),
                    "-strict".to_string(), "experimental".to_string(),
                    "-vsync".to_string(), "cfr".to_string(),
                ]);
            }
        }

        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

// =============================================================================
// FFmpeg Encoder
// =============================================================================

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    video_codec: String,
    audio_codec: String,
    video_bitrate: String,
    audio_bitrate: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self::from_config(&RecorderConfig {
            ffmpeg_path: Some(ffmpeg_path.into()),
            ..RecorderConfig::default()
        })
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            ffmpeg_path: config
                .ffmpeg_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            video_bitrate: config.video_bitrate.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }

    // Check the binary runs at all
    pub fn check(&self) -> Result<(), EncoderError> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                EncoderError::new(
                    None,
                    format!("FFmpeg failed to execute: {}. Path: {:?}", e, self.ffmpeg_path),
                )
            })?;

        if !output.status.success() {
            return Err(EncoderError::new(
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        log::info!("FFmpeg check passed: {:?}", self.ffmpeg_path);
        Ok(())
    }

    fn spawn(&self, args: &[String], pipe_stdin: bool) -> Result<Child, EncoderError> {
        log::info!("Spawning FFmpeg: {:?} {}", self.ffmpeg_path, args.join(" "));

        Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EncoderError::new(
                    None,
                    format!("Failed to spawn FFmpeg at {:?}: {}", self.ffmpeg_path, e),
                )
            })
    }
}

// Drain stderr on its own thread so a chatty encoder never blocks on a full pipe
fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut buf = String::new();
        if let Err(e) = stderr.read_to_string(&mut buf) {
            log::warn!("Error reading FFmpeg stderr: {}", e);
        }
        buf
    }))
}

// Wait for exit; failure carries status and the full stderr
fn finish(
    mut child: Child,
    stderr: Option<JoinHandle<String>>,
    write_error: Option<std::io::Error>,
) -> Result<(), EncoderError> {
    let status = child
        .wait()
        .map_err(|e| EncoderError::new(None, format!("Failed to wait for FFmpeg: {}", e)))?;
    let diagnostics = stderr
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    if status.success() && write_error.is_none() {
        return Ok(());
    }

    let mut diagnostics = diagnostics;
    if let Some(e) = write_error {
        diagnostics = format!("Failed to write frame to FFmpeg: {}\n{}", e, diagnostics);
    }
    log::error!("FFmpeg exited with {:?}: {}", status.code(), diagnostics.trim_end());
    Err(EncoderError::new(status.code(), diagnostics))
}

impl MediaEncoder for FfmpegEncoder {
    fn encode_video(
        &self,
        frames: &[VideoFrame],
        params: EncodeParams,
        output: &Path,
    ) -> Result<(), EncoderError> {
        let first = frames
            .first()
            .ok_or_else(|| EncoderError::new(None, "No frames to encode"))?;

        let args = FfmpegArgs::raw_video(first.width, first.height, output)
            .with_framerate(params.framerate)
            .with_video_codec(params.format.intermediate_codec())
            .with_codec_tag(params.format.fourcc())
            .build();

        let mut child = self.spawn(&args, true)?;
        let stderr = collect_stderr(&mut child);
        let mut write_error = None;

        match child.stdin.take() {
            Some(mut stdin) => {
                for frame in frames {
                    if let Err(e) = stdin.write_all(&frame.pixels) {
                        write_error = Some(e);
                        break;
                    }
                }
                // Close stdin to signal EOF to FFmpeg
                drop(stdin);
            }
            None => {
                write_error = Some(std::io::Error::other("Failed to get FFmpeg stdin"));
            }
        }

        finish(child, stderr, write_error)?;
        log::info!("Encoded {} frames into {:?}", frames.len(), output);
        Ok(())
    }

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        params: EncodeParams,
        output: &Path,
    ) -> Result<PathBuf, EncoderError> {
        let args = FfmpegArgs::mux(video, audio, output)
            .with_framerate(params.framerate)
            .with_video_codec(self.video_codec.as_str())
            .with_audio_codec(self.audio_codec.as_str())
            .with_bitrates(self.video_bitrate.as_str(), self.audio_bitrate.as_str())
            .build();

        let mut child = self.spawn(&args, false)?;
        let stderr = collect_stderr(&mut child);
        finish(child, stderr, None)?;

        if !output.exists() {
            return Err(EncoderError::new(
                Some(0),
                format!("FFmpeg reported success but {:?} was not written", output),
            ));
        }

        log::info!("Muxed {:?} + {:?} -> {:?}", video, audio, output);
        Ok(output.to_path_buf())
    }
}
