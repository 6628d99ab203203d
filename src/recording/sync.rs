/**
 * ============================================================================
 * SYNC MONITOR MODULE
 * ============================================================================
 *
 * PURPOSE: Detect and correct drift between the video and audio producers
 *
 * PERIODIC CHECK:
 * - Both producers push (kind, timestamp) samples into a bounded ring (100)
 * - Once the ring holds more than 30 samples, compare the mean audio and mean
 *   video timestamps; beyond 50 ms, shift every unconsumed video frame (and
 *   the last-video tracker) by the signed difference
 * - The ring is cleared after every evaluation, corrected or not
 *
 * POST-PAUSE CHECK:
 * - After each pause/resume, compare only the last audio and last video
 *   timestamps with the same tolerance and the same correction
 *
 * Audio is ground truth: its timestamps follow the hardware callback cadence.
 *
 * ============================================================================
 */

use crate::recording::buffer::FrameBuffer;
use crate::recording::types::{StreamKind, SyncSample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub const RING_CAPACITY: usize = 100;
pub const EVALUATION_THRESHOLD: usize = 30;
pub const DRIFT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Periodic,
    PostPause,
}

// A corrected drift condition (logged, never raised as an error)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncAdjustment {
    // Signed seconds added to video timestamps
    pub offset: f64,
    // Unconsumed frames rewritten
    pub shifted: usize,
    pub trigger: SyncTrigger,
}

#[derive(Debug, Default)]
struct MonitorState {
    ring: VecDeque<SyncSample>,
    last_audio: f64,
    last_video: f64,
    adjustments: Vec<SyncAdjustment>,
}

#[derive(Debug, Default)]
pub struct SyncMonitor {
    state: Mutex<MonitorState>,
}

// Mean of the timestamps of one kind, None when there are none
fn mean_of(ring: &VecDeque<SyncSample>, kind: StreamKind) -> Option<f64> {
    let (sum, count) = ring
        .iter()
        .filter(|s| s.kind == kind)
        .fold((0.0, 0usize), |(sum, n), s| (sum + s.timestamp, n + 1));
    (count > 0).then(|| sum / count as f64)
}

impl SyncMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Push a producer timestamp; runs the periodic check past the threshold
    pub fn record(&self, sample: SyncSample, frames: &FrameBuffer) -> Option<SyncAdjustment> {
        let mut st = self.lock();

        if st.ring.len() == RING_CAPACITY {
            st.ring.pop_front();
        }
        st.ring.push_back(sample);

        match sample.kind {
            StreamKind::Audio => st.last_audio = sample.timestamp,
            StreamKind::Video => st.last_video = sample.timestamp,
        }

        if st.ring.len() > EVALUATION_THRESHOLD {
            Self::evaluate_locked(&mut st, frames)
        } else {
            None
        }
    }

    // Evaluate whatever the ring holds now
    fn evaluate_locked(st: &mut MonitorState, frames: &FrameBuffer) -> Option<SyncAdjustment> {
        let audio = mean_of(&st.ring, StreamKind::Audio);
        let video = mean_of(&st.ring, StreamKind::Video);
        st.ring.clear();

        let diff = audio? - video?;
        if diff.abs() > DRIFT_TOLERANCE {
            Some(Self::apply_locked(st, diff, frames, SyncTrigger::Periodic))
        } else {
            None
        }
    }

    // Narrow check run synchronously after every pause/resume
    pub fn check_after_pause(&self, frames: &FrameBuffer) -> Option<SyncAdjustment> {
        let mut st = self.lock();
        if st.last_video <= 0.0 || st.last_audio <= 0.0 {
            return None;
        }

        let diff = st.last_audio - st.last_video;
        if diff.abs() > DRIFT_TOLERANCE {
            Some(Self::apply_locked(&mut st, diff, frames, SyncTrigger::PostPause))
        } else {
            None
        }
    }

    fn apply_locked(
        st: &mut MonitorState,
        offset: f64,
        frames: &FrameBuffer,
        trigger: SyncTrigger,
    ) -> SyncAdjustment {
        let shifted = frames.shift_all(offset);
        st.last_video += offset;

        log::warn!(
            "Sync adjustment ({:?}): shifted {} queued frames by {:+.3}s",
            trigger,
            shifted,
            offset
        );

        let adjustment = SyncAdjustment {
            offset,
            shifted,
            trigger,
        };
        st.adjustments.push(adjustment);
        adjustment
    }

    pub fn last_audio(&self) -> f64 {
        self.lock().last_audio
    }

    pub fn last_video(&self) -> f64 {
        self.lock().last_video
    }

    pub fn ring_len(&self) -> usize {
        self.lock().ring.len()
    }

    pub fn adjustments(&self) -> Vec<SyncAdjustment> {
        self.lock().adjustments.clone()
    }

    pub fn reset(&self) {
        *self.lock() = MonitorState::default();
    }
}
