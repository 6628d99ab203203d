/**
 * ============================================================================
 * PAUSE COORDINATOR MODULE
 * ============================================================================
 *
 * PURPOSE: Session state machine and the only synchronization state shared
 * by the producers
 *
 * STATE MACHINE:
 *   Idle -> Recording <-> Paused -> Stopping -> Finalizing -> Idle
 *
 * GUARDED STATE (one mutex, one condvar):
 * - phase, baseline (start gate), pause_started_at, pause accumulator
 * - per-session counters (frames, audio sample frames), reported as deltas
 * - the first fatal producer failure
 *
 * The stop flag is mirrored in an atomic so producer loops can poll it
 * cheaply at each iteration boundary.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::clock::ClockBaseline;
use crate::recording::types::{PauseWindow, SessionPhase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CoordinatorState {
    phase: SessionPhase,
    baseline: Option<ClockBaseline>,
    pause_started_at: Option<Instant>,
    pause_accumulator: Duration,
    pauses: Vec<PauseWindow>,
    frame_count: u64,
    sample_count: u64,
    failure: Option<RecorderError>,
}

impl CoordinatorState {
    fn idle() -> Self {
        Self {
            phase: SessionPhase::Idle,
            baseline: None,
            pause_started_at: None,
            pause_accumulator: Duration::ZERO,
            pauses: Vec::new(),
            frame_count: 0,
            sample_count: 0,
            failure: None,
        }
    }

    // Fold an open pause window into the accumulator
    fn close_pause(&mut self, now: Instant) -> Option<PauseWindow> {
        let started = self.pause_started_at.take()?;
        let duration = now.saturating_duration_since(started);
        self.pause_accumulator += duration;

        let window = PauseWindow {
            started_at: self.baseline.map(|b| b.elapsed_at(started)).unwrap_or(0.0),
            duration: duration.as_secs_f64(),
        };
        self.pauses.push(window);
        Some(window)
    }
}

#[derive(Debug)]
pub struct PauseCoordinator {
    state: Mutex<CoordinatorState>,
    gate: Condvar,
    stop: AtomicBool,
}

impl Default for PauseCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordinatorState::idle()),
            gate: Condvar::new(),
            stop: AtomicBool::new(false),
        }
    }

    // A panicking producer must not wedge the coordinator
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn is_paused(&self) -> bool {
        self.lock().phase == SessionPhase::Paused
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    // Idle -> Recording
    pub fn begin(&self) -> Result<()> {
        let mut st = self.lock();
        if st.phase != SessionPhase::Idle {
            return Err(RecorderError::State(format!(
                "Cannot start a session while {:?}",
                st.phase
            )));
        }

        *st = CoordinatorState::idle();
        st.phase = SessionPhase::Recording;
        self.stop.store(false, Ordering::SeqCst);
        Ok(())
    }

    // Set the baseline and open the start gate
    pub fn mark_baseline(&self, now: Instant) -> ClockBaseline {
        let mut st = self.lock();
        let baseline = *st.baseline.get_or_insert(ClockBaseline::at(now));
        self.gate.notify_all();
        baseline
    }

    pub fn baseline(&self) -> Option<ClockBaseline> {
        self.lock().baseline
    }

    // Block until the baseline is set; None if the session stops first
    pub fn wait_for_baseline(&self) -> Option<ClockBaseline> {
        let mut st = self.lock();
        loop {
            if let Some(baseline) = st.baseline {
                return Some(baseline);
            }
            if self.should_stop() {
                return None;
            }
            st = self.gate.wait(st).unwrap_or_else(|e| e.into_inner());
        }
    }

    // Recording -> Paused
    pub fn pause(&self, now: Instant) -> Result<()> {
        let mut st = self.lock();
        if st.phase != SessionPhase::Recording {
            return Err(RecorderError::State(format!("Cannot pause while {:?}", st.phase)));
        }

        st.phase = SessionPhase::Paused;
        st.pause_started_at = Some(now);
        log::info!("Recording paused");
        Ok(())
    }

    // Paused -> Recording; the pause duration joins the accumulator
    pub fn resume(&self, now: Instant) -> Result<PauseWindow> {
        let mut st = self.lock();
        if st.phase != SessionPhase::Paused {
            return Err(RecorderError::State(format!("Cannot resume while {:?}", st.phase)));
        }

        let window = st.close_pause(now).unwrap_or(PauseWindow {
            started_at: 0.0,
            duration: 0.0,
        });
        st.phase = SessionPhase::Recording;
        self.gate.notify_all();

        log::info!("Recording resumed, paused for {:.3}s", window.duration);
        Ok(window)
    }

    // Block while paused; false once a stop has been requested
    pub fn wait_while_paused(&self) -> bool {
        let mut st = self.lock();
        while st.phase == SessionPhase::Paused && !self.should_stop() {
            st = self.gate.wait(st).unwrap_or_else(|e| e.into_inner());
        }
        !self.should_stop()
    }

    // Sleep up to `timeout` unless a stop arrives; returns the stop flag
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let st = self.lock();
        if self.should_stop() {
            return true;
        }
        let _ = self
            .gate
            .wait_timeout_while(st, timeout, |_| !self.should_stop())
            .unwrap_or_else(|e| e.into_inner());
        self.should_stop()
    }

    fn stop_locked(&self, st: &mut CoordinatorState, now: Instant) -> bool {
        if !st.phase.is_active() {
            return false;
        }

        if st.phase == SessionPhase::Paused {
            st.close_pause(now);
        }
        st.phase = SessionPhase::Stopping;
        self.stop.store(true, Ordering::SeqCst);
        self.gate.notify_all();
        true
    }

    // Recording/Paused -> Stopping; a repeated request is a no-op
    pub fn request_stop(&self) -> bool {
        let mut st = self.lock();
        let stopped = self.stop_locked(&mut st, Instant::now());
        if stopped {
            log::info!("Stop requested");
        }
        stopped
    }

    // Record a fatal producer failure and stop both producers
    pub fn fail(&self, error: RecorderError) {
        let mut st = self.lock();
        log::error!("Session failure: {}", error);
        if st.failure.is_none() {
            st.failure = Some(error);
        }
        self.stop_locked(&mut st, Instant::now());
    }

    pub fn take_failure(&self) -> Option<RecorderError> {
        self.lock().failure.take()
    }

    pub fn failure_message(&self) -> Option<String> {
        self.lock().failure.as_ref().map(|e| e.to_string())
    }

    // Stopping -> Finalizing, once both producers have been joined
    pub fn mark_finalizing(&self) -> Result<()> {
        let mut st = self.lock();
        if st.phase != SessionPhase::Stopping {
            return Err(RecorderError::State(format!(
                "Cannot finalize while {:?}",
                st.phase
            )));
        }
        st.phase = SessionPhase::Finalizing;
        Ok(())
    }

    // Any phase -> Idle with counters and accumulator zeroed
    pub fn finish(&self) {
        let mut st = self.lock();
        *st = CoordinatorState::idle();
        self.stop.store(false, Ordering::SeqCst);
        self.gate.notify_all();
    }

    // Logical timestamp for `now`; None unless actively recording
    pub fn timestamp_at(&self, now: Instant) -> Option<f64> {
        let st = self.lock();
        if st.phase != SessionPhase::Recording {
            return None;
        }
        st.baseline.map(|b| b.timestamp_at(now, st.pause_accumulator))
    }

    // Scheduled instant of tick `n`, shifted by the pause accumulator
    pub fn next_tick(&self, n: u64, frame: Duration) -> Option<Instant> {
        let st = self.lock();
        st.baseline.map(|b| b.tick(n, frame, st.pause_accumulator))
    }

    // Video producer reports one pushed frame; returns the new total
    pub fn record_video_frame(&self) -> u64 {
        let mut st = self.lock();
        st.frame_count += 1;
        st.frame_count
    }

    // Audio producer reports captured sample frames; returns the new total
    pub fn record_audio_frames(&self, frames: u64) -> u64 {
        let mut st = self.lock();
        st.sample_count += frames;
        st.sample_count
    }

    pub fn frame_count(&self) -> u64 {
        self.lock().frame_count
    }

    pub fn sample_count(&self) -> u64 {
        self.lock().sample_count
    }

    pub fn pause_accumulator(&self) -> Duration {
        self.lock().pause_accumulator
    }

    pub fn pauses(&self) -> Vec<PauseWindow> {
        self.lock().pauses.clone()
    }

    // Recording time so far, excluding paused wall-clock time
    pub fn elapsed(&self, now: Instant) -> f64 {
        let st = self.lock();
        let Some(baseline) = st.baseline else {
            return 0.0;
        };
        let open_pause = st
            .pause_started_at
            .map(|p| now.saturating_duration_since(p))
            .unwrap_or_default();
        baseline.timestamp_at(now, st.pause_accumulator + open_pause).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_state_machine_happy_path() {
        let c = PauseCoordinator::new();
        assert_eq!(c.phase(), SessionPhase::Idle);

        c.begin().unwrap();
        assert_eq!(c.phase(), SessionPhase::Recording);

        let t0 = Instant::now();
        c.mark_baseline(t0);
        c.pause(t0 + Duration::from_secs(1)).unwrap();
        assert!(c.is_paused());

        let window = c.resume(t0 + Duration::from_millis(1500)).unwrap();
        assert!((window.duration - 0.5).abs() < 1e-9);
        assert!((window.started_at - 1.0).abs() < 1e-9);
        assert_eq!(c.pause_accumulator(), Duration::from_millis(500));

        assert!(c.request_stop());
        assert_eq!(c.phase(), SessionPhase::Stopping);
        c.mark_finalizing().unwrap();
        assert_eq!(c.phase(), SessionPhase::Finalizing);

        c.finish();
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert_eq!(c.pause_accumulator(), Duration::ZERO);
        assert!(c.pauses().is_empty());
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let c = PauseCoordinator::new();
        c.begin().unwrap();
        assert!(matches!(c.begin(), Err(RecorderError::State(_))));
        assert_eq!(c.phase(), SessionPhase::Recording);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let c = PauseCoordinator::new();
        assert!(!c.request_stop());

        c.begin().unwrap();
        assert!(c.request_stop());
        assert!(!c.request_stop());
        assert_eq!(c.phase(), SessionPhase::Stopping);
    }

    #[test]
    fn test_invalid_transitions() {
        let c = PauseCoordinator::new();
        assert!(c.pause(Instant::now()).is_err());
        assert!(c.resume(Instant::now()).is_err());
        assert!(c.mark_finalizing().is_err());

        c.begin().unwrap();
        assert!(c.resume(Instant::now()).is_err());
    }

    #[test]
    fn test_timestamps_exclude_pause() {
        let c = PauseCoordinator::new();
        c.begin().unwrap();
        let t0 = Instant::now();
        c.mark_baseline(t0);

        c.pause(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(c.timestamp_at(t0 + Duration::from_secs(3)), None);
        c.resume(t0 + Duration::from_secs(5)).unwrap();

        let ts = c.timestamp_at(t0 + Duration::from_secs(6)).unwrap();
        assert!((ts - 3.0).abs() < 1e-9);

        let tick = c.next_tick(0, Duration::from_millis(100)).unwrap();
        assert_eq!(tick, t0 + Duration::from_secs(3));
    }

    #[test]
    fn test_stop_while_paused_closes_window() {
        let c = PauseCoordinator::new();
        c.begin().unwrap();
        c.mark_baseline(Instant::now());
        c.pause(Instant::now()).unwrap();
        assert!(c.request_stop());
        assert_eq!(c.pauses().len(), 1);
    }

    #[test]
    fn test_paused_producer_wakes_on_resume() {
        let c = Arc::new(PauseCoordinator::new());
        c.begin().unwrap();
        c.mark_baseline(Instant::now());
        c.pause(Instant::now()).unwrap();

        let waiter = {
            let c = c.clone();
            thread::spawn(move || c.wait_while_paused())
        };

        thread::sleep(Duration::from_millis(30));
        c.resume(Instant::now()).unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_paused_producer_wakes_on_stop() {
        let c = Arc::new(PauseCoordinator::new());
        c.begin().unwrap();
        c.mark_baseline(Instant::now());
        c.pause(Instant::now()).unwrap();

        let waiter = {
            let c = c.clone();
            thread::spawn(move || c.wait_while_paused())
        };

        thread::sleep(Duration::from_millis(30));
        c.request_stop();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_start_gate_releases_waiter() {
        let c = Arc::new(PauseCoordinator::new());
        c.begin().unwrap();

        let waiter = {
            let c = c.clone();
            thread::spawn(move || c.wait_for_baseline())
        };

        thread::sleep(Duration::from_millis(20));
        let t0 = Instant::now();
        let marked = c.mark_baseline(t0);
        assert_eq!(waiter.join().unwrap(), Some(marked));
    }

    #[test]
    fn test_start_gate_released_by_stop() {
        let c = Arc::new(PauseCoordinator::new());
        c.begin().unwrap();

        let waiter = {
            let c = c.clone();
            thread::spawn(move || c.wait_for_baseline())
        };

        thread::sleep(Duration::from_millis(20));
        c.request_stop();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn test_failure_stops_session() {
        let c = PauseCoordinator::new();
        c.begin().unwrap();
        c.fail(RecorderError::Device("unplugged".to_string()));
        c.fail(RecorderError::Device("second".to_string()));

        assert!(c.should_stop());
        assert_eq!(c.phase(), SessionPhase::Stopping);
        assert!(c.failure_message().unwrap().contains("unplugged"));
        assert!(matches!(c.take_failure(), Some(RecorderError::Device(_))));
        assert!(c.take_failure().is_none());
    }

    #[test]
    fn test_counters_report_deltas() {
        let c = PauseCoordinator::new();
        c.begin().unwrap();
        assert_eq!(c.record_video_frame(), 1);
        assert_eq!(c.record_video_frame(), 2);
        assert_eq!(c.record_audio_frames(512), 512);
        assert_eq!(c.record_audio_frames(512), 1024);

        c.finish();
        assert_eq!(c.frame_count(), 0);
        assert_eq!(c.sample_count(), 0);
    }
}
