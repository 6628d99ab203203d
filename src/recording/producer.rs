/**
 * ============================================================================
 * PRODUCER MODULE
 * ============================================================================
 *
 * PURPOSE: Common shape for the two capture producers
 *
 * The video loop is polled on a fixed cadence and the audio path is driven by
 * device callbacks, but the coordinator treats both the same way:
 * start -> (on_pause / on_resume)* -> stop (join).
 *
 * SessionContext is everything a producer shares with the coordinator and the
 * finalizer: the pause coordinator, both buffers, the sync monitor and the
 * level meter.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::audio::LevelMeter;
use crate::recording::buffer::{FrameBuffer, SampleBuffer};
use crate::recording::pause::PauseCoordinator;
use crate::recording::sync::SyncMonitor;
use crate::recording::types::StreamKind;
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Default)]
pub struct SessionContext {
    pub coordinator: PauseCoordinator,
    pub frames: FrameBuffer,
    pub samples: SampleBuffer,
    pub sync: SyncMonitor,
    pub meter: LevelMeter,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    // Drop everything buffered and forget drift history
    pub fn clear(&self) {
        self.frames.clear();
        self.samples.clear();
        self.sync.reset();
        self.meter.reset();
    }
}

// What a producer reports once joined
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerStats {
    pub kind: StreamKind,
    // Frames (video) or sample frames (audio) produced
    pub units: u64,
    pub last_timestamp: f64,
}

impl ProducerStats {
    pub fn empty(kind: StreamKind) -> Self {
        Self {
            kind,
            units: 0,
            last_timestamp: 0.0,
        }
    }
}

pub trait Producer: Send {
    fn kind(&self) -> StreamKind;

    // Spawn the producer; it must observe the coordinator's stop flag
    fn start(&mut self, ctx: Arc<SessionContext>) -> Result<()>;

    // Notifications only. The pause gate itself lives in PauseCoordinator:
    // the video loop blocks on it and audio callbacks drop data while paused.
    fn on_pause(&mut self) {}

    fn on_resume(&mut self) {}

    // Block until the producer has exited its loop
    fn stop(&mut self) -> Result<ProducerStats>;
}

// Join a producer thread; a panic is reported as a device failure
pub(crate) fn join_producer(
    kind: StreamKind,
    handle: Option<JoinHandle<ProducerStats>>,
) -> Result<ProducerStats> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| RecorderError::Device(format!("{:?} producer thread panicked", kind))),
        None => Ok(ProducerStats::empty(kind)),
    }
}
