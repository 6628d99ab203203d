/**
 * ============================================================================
 * RECORDING MANAGER MODULE
 * ============================================================================
 *
 * PURPOSE: Session lifecycle facade over the producers and the finalizer
 *
 * RESPONSIBILITIES:
 * - Start a session: validate, lease the microphone, start both producers
 * - Pause/resume through the coordinator, then run the post-pause sync check
 * - Stop: request stop, join both producers, finalize, write the sidecar
 * - Status snapshots and the live audio level for a UI layer
 * - Reset to a clean Idle recorder (buffers, counters, scratch)
 *
 * RECORDING FLOW:
 * 1. start -> audio thread waits on the start gate, video thread opens the
 *    screen and marks the baseline
 * 2. pause/resume -> pause accumulator grows, both timelines stay gap-free
 * 3. stop -> Stopping -> join -> Finalizing -> finalize -> Idle
 * 4. A producer failure stops the session; stop() returns that failure
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::audio::{AudioCapture, AudioInput, CpalInput};
use crate::recording::capture::{ScapProvider, ScreenProvider, ScreenSettings};
use crate::recording::config::RecorderConfig;
use crate::recording::encoder::{EncodeParams, MediaEncoder};
use crate::recording::finalize::{FinalizeInput, finalize};
use crate::recording::producer::{Producer, ProducerStats, SessionContext};
use crate::recording::storage::{self, ScratchDir};
use crate::recording::types::*;
use crate::recording::video::VideoCapture;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Where frames and samples come from
#[derive(Clone)]
pub struct CaptureSources {
    pub screen: Arc<dyn ScreenProvider>,
    pub audio: Arc<dyn AudioInput>,
}

impl CaptureSources {
    // scap for the screen, cpal for the microphone
    pub fn system() -> Self {
        Self {
            screen: Arc::new(ScapProvider),
            audio: Arc::new(CpalInput),
        }
    }
}

// Cloneable stop request usable from any thread
#[derive(Clone)]
pub struct StopHandle {
    ctx: Arc<SessionContext>,
}

impl StopHandle {
    // Returns true only for the request that actually stopped the session
    pub fn request_stop(&self) -> bool {
        self.ctx.coordinator.request_stop()
    }
}

struct ActiveSession {
    output: PathBuf,
    started_at: DateTime<Utc>,
    params: EncodeParams,
    audio_spec: Option<StreamSpec>,
    producers: Vec<Box<dyn Producer>>,
}

pub struct Recorder {
    config: RecorderConfig,
    encoder: Arc<dyn MediaEncoder>,
    sources: CaptureSources,
    ctx: Arc<SessionContext>,
    scratch: ScratchDir,
    area: Option<Rect>,
    session: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        encoder: Arc<dyn MediaEncoder>,
        sources: CaptureSources,
    ) -> Result<Self> {
        config.validate()?;
        let scratch = ScratchDir::create(config.scratch_root.as_deref())?;

        Ok(Self {
            config,
            encoder,
            sources,
            ctx: Arc::new(SessionContext::new()),
            scratch,
            area: None,
            session: None,
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    // Volume may change mid-session; capture and output settings may not
    pub fn set_config(&mut self, config: RecorderConfig) -> Result<()> {
        config.validate()?;
        if self.session.is_some() && self.config.needs_session_restart(&config) {
            return Err(RecorderError::State(
                "Capture settings cannot change during a recording".to_string(),
            ));
        }
        self.config = config;
        Ok(())
    }

    pub fn set_recording_area(&mut self, area: Option<Rect>) -> Result<()> {
        if self.session.is_some() {
            return Err(RecorderError::State(
                "Recording area cannot change during a recording".to_string(),
            ));
        }
        log::info!("Recording area set to {:?}", area);
        self.area = area;
        Ok(())
    }

    pub fn recording_area(&self) -> Option<Rect> {
        self.area
    }

    pub fn scratch_dir(&self) -> &std::path::Path {
        self.scratch.path()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            ctx: self.ctx.clone(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.ctx.coordinator.phase()
    }

    // Sleep up to `timeout` unless the session stops (request or failure)
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        self.ctx.coordinator.wait_for_stop(timeout)
    }

    // Pick the device and its stream format before anything starts
    fn resolve_audio(&self, request: &SessionRequest) -> Result<Option<(usize, StreamSpec)>> {
        if !request.record_audio {
            return Ok(None);
        }

        let devices = self.sources.audio.devices()?;
        let index = request
            .device_index
            .or_else(|| self.sources.audio.default_device())
            .ok_or_else(|| RecorderError::Device("No input device available".to_string()))?;

        let device = devices
            .iter()
            .find(|d| d.index == index)
            .ok_or_else(|| RecorderError::Device(format!("Audio device {} not found", index)))?;

        Ok(Some((index, self.config.stream_spec(Some(device.channels)))))
    }

    pub fn start(&mut self, request: SessionRequest) -> Result<()> {
        if self.session.is_some() || self.ctx.coordinator.phase() != SessionPhase::Idle {
            return Err(RecorderError::State("Already recording".to_string()));
        }

        self.config.validate()?;
        let audio = self.resolve_audio(&request)?;
        let output = self.config.output_format.apply_extension(request.output.clone());

        // Intermediates kept after an encoder failure stay where they are
        if self.scratch.is_preserved() {
            self.scratch = ScratchDir::create(self.config.scratch_root.as_deref())?;
        } else {
            self.scratch.clear()?;
        }
        self.ctx.clear();
        self.ctx.coordinator.begin()?;

        let mut producers: Vec<Box<dyn Producer>> = Vec::new();

        // Audio first: a busy device fails before any thread exists
        if let Some((device, spec)) = audio {
            let mut capture = AudioCapture::new(self.sources.audio.clone(), device, spec);
            if let Err(e) = capture.start(self.ctx.clone()) {
                self.ctx.coordinator.finish();
                return Err(e);
            }
            producers.push(Box::new(capture));
        }

        let settings = ScreenSettings {
            display_index: 0,
            fps: self.config.framerate,
            show_cursor: self.config.show_cursor,
        };
        let mut video = VideoCapture::new(self.sources.screen.clone(), settings, self.area);
        if let Err(e) = video.start(self.ctx.clone()) {
            self.ctx.coordinator.request_stop();
            for producer in producers.iter_mut() {
                let _ = producer.stop();
            }
            self.ctx.clear();
            self.ctx.coordinator.finish();
            return Err(e);
        }
        producers.push(Box::new(video));

        log::info!(
            "Recording started: {} fps, area {:?}, audio {:?} -> {:?}",
            self.config.framerate,
            self.area,
            audio,
            output
        );

        self.session = Some(ActiveSession {
            output,
            started_at: Utc::now(),
            params: EncodeParams {
                framerate: self.config.framerate,
                format: self.config.output_format,
            },
            audio_spec: audio.map(|(_, spec)| spec),
            producers,
        });
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RecorderError::State("No active recording".to_string()))?;

        self.ctx.coordinator.pause(Instant::now())?;
        for producer in session.producers.iter_mut() {
            producer.on_pause();
        }
        self.ctx.sync.check_after_pause(&self.ctx.frames);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RecorderError::State("No active recording".to_string()))?;

        self.ctx.coordinator.resume(Instant::now())?;
        for producer in session.producers.iter_mut() {
            producer.on_resume();
        }
        self.ctx.sync.check_after_pause(&self.ctx.frames);
        Ok(())
    }

    // Returns the phase after toggling
    pub fn toggle_pause(&mut self) -> Result<SessionPhase> {
        match self.ctx.coordinator.phase() {
            SessionPhase::Recording => self.pause()?,
            SessionPhase::Paused => self.resume()?,
            other => {
                return Err(RecorderError::State(format!(
                    "Cannot toggle pause while {:?}",
                    other
                )));
            }
        }
        Ok(self.ctx.coordinator.phase())
    }

    // Stop, join both producers, finalize
    pub fn stop(&mut self) -> Result<SessionReport> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| RecorderError::State("No active recording".to_string()))?;

        self.ctx.coordinator.request_stop();

        let mut joined: Vec<Result<ProducerStats>> = Vec::new();
        for producer in session.producers.iter_mut() {
            let result = producer.stop();
            if let Err(e) = &result {
                log::warn!("{:?} producer failed to join: {}", producer.kind(), e);
            }
            joined.push(result);
        }
        log::info!("Producers joined");

        if let Some(failure) = self.ctx.coordinator.take_failure() {
            self.discard_session();
            return Err(failure);
        }
        let mut stats = Vec::new();
        for result in joined {
            match result {
                Ok(s) => stats.push(s),
                Err(e) => {
                    self.discard_session();
                    return Err(e);
                }
            }
        }

        let pauses = self.ctx.coordinator.pauses();
        let adjustments: Vec<f64> = self.ctx.sync.adjustments().iter().map(|a| a.offset).collect();

        self.ctx.coordinator.mark_finalizing()?;
        let input = FinalizeInput {
            frames: self.ctx.frames.drain(),
            chunks: self.ctx.samples.drain(),
            audio_spec: session.audio_spec,
            params: session.params,
            volume: self.config.volume,
        };

        let result = finalize(self.encoder.as_ref(), input, &mut self.scratch, &session.output);

        // Finalizing -> Idle on either outcome
        self.ctx.clear();
        self.ctx.coordinator.finish();

        let outcome = result?;
        let report = SessionReport {
            output: outcome.output,
            start_time: session.started_at.to_rfc3339(),
            end_time: Utc::now().to_rfc3339(),
            framerate: session.params.framerate,
            frame_count: outcome.frame_count,
            achieved_fps: outcome.achieved_fps,
            video_duration_seconds: outcome.video_duration_seconds,
            audio_muxed: outcome.audio_muxed,
            audio_sample_count: outcome.audio_sample_count,
            audio_duration_seconds: outcome.audio_duration_seconds,
            pauses,
            sync_adjustments: adjustments,
        };

        for s in &stats {
            log::debug!("{:?} producer: {} units, last {:.3}s", s.kind, s.units, s.last_timestamp);
        }
        if let Err(e) = storage::save_report(&report) {
            log::warn!("Failed to save session report: {}", e);
        }

        Ok(report)
    }

    // Producer failure: nothing is finalized
    fn discard_session(&mut self) {
        log::warn!(
            "Discarding session data ({} frames, {} chunks)",
            self.ctx.frames.len(),
            self.ctx.samples.len()
        );
        self.ctx.clear();
        self.ctx.coordinator.finish();
    }

    // Back to a clean Idle recorder; a no-op apart from clearing when already idle
    pub fn reset(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(RecorderError::State(
                "Stop the recording before resetting".to_string(),
            ));
        }

        self.ctx.clear();
        self.ctx.coordinator.finish();
        self.scratch.clear()?;
        log::info!("Recorder reset");
        Ok(())
    }

    pub fn audio_level(&self) -> f32 {
        self.ctx.meter.level()
    }

    pub fn status(&self) -> RecordingStatus {
        let coordinator = &self.ctx.coordinator;
        let phase = coordinator.phase();
        let open_pause = usize::from(phase == SessionPhase::Paused);

        RecordingStatus {
            phase,
            elapsed_seconds: coordinator.elapsed(Instant::now()),
            frame_count: coordinator.frame_count(),
            sample_count: coordinator.sample_count(),
            pause_count: coordinator.pauses().len() + open_pause,
            audio_level: self.ctx.meter.level(),
            scratch_bytes: self.scratch.total_bytes(),
            failure: coordinator.failure_message(),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Never leave producer threads running past the recorder
        if let Some(mut session) = self.session.take() {
            log::warn!("Recorder dropped mid-session; stopping producers");
            self.ctx.coordinator.request_stop();
            for producer in session.producers.iter_mut() {
                let _ = producer.stop();
            }
            self.ctx.clear();
            self.ctx.coordinator.finish();
        }
    }
}
