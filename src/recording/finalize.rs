/**
 * ============================================================================
 * FINALIZER MODULE
 * ============================================================================
 *
 * PURPOSE: Turn the drained frame and sample sequences into the final file
 *
 * STEPS:
 * 1. Encode frames (push order) into a video-only intermediate at the session
 *    framerate; report the achieved average fps
 * 2. Concatenate audio chunks in arrival order, scale by volume, clip to
 *    [-1.0, 1.0], write a float32 WAV intermediate
 * 3. Audio present: mux video + audio through the media encoder
 * 4. No audio: the intermediate is moved into place as the output
 *
 * Only one finalization runs at a time, process-wide. Encoder failures keep
 * the intermediates on disk and surface the encoder's diagnostics.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::encoder::{EncodeParams, MediaEncoder};
use crate::recording::storage::{ScratchDir, move_file};
use crate::recording::types::{AudioChunk, StreamSpec, VideoFrame};
use hound::{SampleFormat, WavSpec, WavWriter};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

static FINALIZE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug)]
pub struct FinalizeInput {
    pub frames: Vec<VideoFrame>,
    pub chunks: Vec<AudioChunk>,
    // None when the session ran without audio
    pub audio_spec: Option<StreamSpec>,
    pub params: EncodeParams,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    pub output: PathBuf,
    pub frame_count: u64,
    pub achieved_fps: Option<f64>,
    pub video_duration_seconds: f64,
    pub audio_muxed: bool,
    pub audio_sample_count: u64,
    pub audio_duration_seconds: f64,
}

pub fn finalize(
    encoder: &dyn MediaEncoder,
    input: FinalizeInput,
    scratch: &mut ScratchDir,
    output: &Path,
) -> Result<FinalizeOutcome> {
    let _guard = FINALIZE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let frames = consistent_frames(input.frames);
    if frames.is_empty() {
        return Err(RecorderError::EmptySession);
    }

    let frame_count = frames.len() as u64;
    let achieved_fps = achieved_fps(&frames);
    match achieved_fps {
        Some(fps) => log::info!(
            "Finalizing {} frames (target {} fps, achieved {:.2} fps)",
            frame_count,
            input.params.framerate,
            fps
        ),
        None => log::info!("Finalizing {} frame(s)", frame_count),
    }

    // Step 1: video-only intermediate
    let video_path = scratch.video_path(input.params.format);
    if let Err(e) = encoder.encode_video(&frames, input.params, &video_path) {
        scratch.preserve();
        return Err(e.into());
    }
    drop(frames);

    let video_duration_seconds = frame_count as f64 / input.params.framerate.max(1) as f64;

    // Step 2: audio intermediate
    let audio = match input.audio_spec {
        Some(spec) if !input.chunks.is_empty() => {
            let raw = concat_chunks(&input.chunks);
            let frames_total: u64 = input.chunks.iter().map(|c| c.frame_count as u64).sum();

            let mut scaled = apply_volume(&raw, input.volume);
            clip_samples(&mut scaled);

            let audio_path = scratch.audio_path();
            write_wav(&audio_path, spec, &scaled)?;
            Some((audio_path, frames_total, spec))
        }
        _ => None,
    };

    // Steps 3 and 4
    let outcome = match audio {
        Some((audio_path, sample_count, spec)) => {
            let muxed = match encoder.mux(&video_path, &audio_path, input.params, output) {
                Ok(path) => path,
                Err(e) => {
                    scratch.preserve();
                    return Err(e.into());
                }
            };
            FinalizeOutcome {
                output: muxed,
                frame_count,
                achieved_fps,
                video_duration_seconds,
                audio_muxed: true,
                audio_sample_count: sample_count,
                audio_duration_seconds: sample_count as f64 / spec.sample_rate.max(1) as f64,
            }
        }
        None => {
            move_file(&video_path, output)?;
            log::info!("No audio captured; moved {:?} -> {:?}", video_path, output);
            FinalizeOutcome {
                output: output.to_path_buf(),
                frame_count,
                achieved_fps,
                video_duration_seconds,
                audio_muxed: false,
                audio_sample_count: 0,
                audio_duration_seconds: 0.0,
            }
        }
    };

    log::info!("Recording saved to {:?}", outcome.output);
    Ok(outcome)
}

// Keep frames matching the first frame's size; the encoder takes one size
fn consistent_frames(frames: Vec<VideoFrame>) -> Vec<VideoFrame> {
    let Some((width, height)) = frames.first().map(|f| (f.width, f.height)) else {
        return frames;
    };
    let expected = width as usize * height as usize * 3;

    let total = frames.len();
    let kept: Vec<VideoFrame> = frames
        .into_iter()
        .filter(|f| f.width == width && f.height == height && f.pixels.len() == expected)
        .collect();

    if kept.len() < total {
        log::warn!(
            "Skipped {} frame(s) not matching {}x{}",
            total - kept.len(),
            width,
            height
        );
    }
    kept
}

// (n - 1) intervals over the first-to-last timestamp span
pub fn achieved_fps(frames: &[VideoFrame]) -> Option<f64> {
    let first = frames.first()?.timestamp;
    let last = frames.last()?.timestamp;
    let span = last - first;
    (frames.len() > 1 && span > 0.0).then(|| (frames.len() - 1) as f64 / span)
}

pub fn concat_chunks(chunks: &[AudioChunk]) -> Vec<f32> {
    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.samples.len()).sum());
    for chunk in chunks {
        out.extend_from_slice(&chunk.samples);
    }
    out
}

// Scale only; clipping is a separate step
pub fn apply_volume(samples: &[f32], volume: f32) -> Vec<f32> {
    samples.iter().map(|s| s * volume).collect()
}

pub fn clip_samples(samples: &mut [f32]) {
    for s in samples.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
}

pub fn write_wav(path: &Path, spec: StreamSpec, samples: &[f32]) -> Result<()> {
    let wav_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, wav_spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    log::info!(
        "Wrote {} samples ({} ch @ {} Hz) to {:?}",
        samples.len(),
        spec.channels,
        spec.sample_rate,
        path
    );
    Ok(())
}
