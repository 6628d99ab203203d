mod common;

use common::*;
use std::thread;
use std::time::{Duration, Instant};
use syncrec::recording::storage::{load_report, report_path};
use syncrec::{Rect, SessionPhase, SessionRequest};

const FRAME: f64 = 1.0 / 30.0;

#[test]
fn three_second_session_yields_ninety_frames_and_three_seconds_of_audio() {
    let mut h = harness(101);
    let output = h.output("three.mp4");

    h.recorder.start(SessionRequest::new(&output).with_device(101)).unwrap();
    thread::sleep(Duration::from_secs(3));
    let report = h.recorder.stop().unwrap();

    assert!(
        (88..=92).contains(&report.frame_count),
        "got {} frames",
        report.frame_count
    );
    assert!(report.audio_muxed);
    assert!(
        (report.audio_duration_seconds - 3.0).abs() < 0.15,
        "audio duration {}",
        report.audio_duration_seconds
    );
    let fps = report.achieved_fps.unwrap();
    assert!((fps - 30.0).abs() < 1.5, "achieved {} fps", fps);

    assert!(output.exists());
    let log = h.encoder.log();
    assert_eq!(log.mux_calls, 1);
    assert_eq!(log.audio_channels, 2);
    assert_eq!(std::fs::read(&output).unwrap(), [log.video_bytes, b"+audio".to_vec()].concat());
}

#[test]
fn video_timeline_is_monotonic_without_pauses() {
    let mut h = harness(102);
    h.recorder
        .start(SessionRequest::new(h.output("mono.mp4")).without_audio())
        .unwrap();
    thread::sleep(Duration::from_millis(700));
    h.recorder.stop().unwrap();

    let ts = h.encoder.log().frame_timestamps;
    assert!(ts.len() > 10);
    assert!(ts.windows(2).all(|w| w[0] < w[1]));
    assert!(ts[0] >= 0.0 && ts[0] < FRAME);
}

#[test]
fn pauses_are_excluded_from_the_timeline() {
    let mut h = harness(103);
    let wall_start = Instant::now();
    h.recorder
        .start(SessionRequest::new(h.output("paused.mp4")).without_audio())
        .unwrap();

    thread::sleep(Duration::from_millis(600));
    h.recorder.pause().unwrap();
    assert_eq!(h.recorder.status().phase, SessionPhase::Paused);
    // A grab already past its timestamp may still land
    thread::sleep(Duration::from_millis(50));
    let frames_at_pause = h.recorder.status().frame_count;
    thread::sleep(Duration::from_millis(450));
    assert_eq!(h.recorder.status().frame_count, frames_at_pause);
    h.recorder.resume().unwrap();

    thread::sleep(Duration::from_millis(600));
    let wall = wall_start.elapsed().as_secs_f64();
    let report = h.recorder.stop().unwrap();

    assert_eq!(report.pauses.len(), 1);
    let paused: f64 = report.pauses.iter().map(|p| p.duration).sum();
    assert!((paused - 0.5).abs() < 0.05, "paused {}", paused);

    let ts = h.encoder.log().frame_timestamps;
    let last = *ts.last().unwrap();
    let gap = wall - paused - last;
    assert!(gap >= -0.01 && gap < FRAME + 0.05, "gap {}", gap);

    // No hole where the pause was
    assert!(ts.windows(2).all(|w| w[1] - w[0] < 2.5 * FRAME));
}

#[test]
fn video_only_session_moves_intermediate_into_place() {
    let mut h = harness(104);
    let output = h.output("silent");

    h.recorder
        .start(SessionRequest::new(&output).without_audio())
        .unwrap();
    thread::sleep(Duration::from_millis(300));
    let report = h.recorder.stop().unwrap();

    // Extension appended for the configured format
    assert_eq!(report.output, h.output("silent.mp4"));
    assert!(!report.audio_muxed);
    assert_eq!(report.audio_sample_count, 0);

    let log = h.encoder.log();
    assert_eq!(log.mux_calls, 0);
    assert_eq!(std::fs::read(&report.output).unwrap(), log.video_bytes);
    assert!(!h.recorder.scratch_dir().join("video_only.mp4").exists());
}

#[test]
fn unity_volume_keeps_samples_bit_identical() {
    let mut mic = SyntheticMic::new(105);
    mic.level = 0.123_456_79;
    let mut h = harness_with(SyntheticScreenProvider::default(), mic, RecordingEncoder::default());

    h.recorder
        .start(SessionRequest::new(h.output("unity.mp4")).with_device(105))
        .unwrap();
    thread::sleep(Duration::from_millis(400));
    h.recorder.stop().unwrap();

    let samples = h.encoder.log().audio_samples;
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|s| s.to_bits() == 0.123_456_79f32.to_bits()));
}

#[test]
fn volume_is_applied_and_clipped() {
    let mut mic = SyntheticMic::new(106);
    mic.level = 0.75;
    let mut h = harness_with(SyntheticScreenProvider::default(), mic, RecordingEncoder::default());

    let mut config = h.recorder.config().clone();
    config.volume = 2.0;
    h.recorder.set_config(config).unwrap();

    h.recorder
        .start(SessionRequest::new(h.output("loud.mp4")).with_device(106))
        .unwrap();
    thread::sleep(Duration::from_millis(300));
    h.recorder.stop().unwrap();

    let samples = h.encoder.log().audio_samples;
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|&s| s == 1.0));
}

#[test]
fn stopping_mid_session_still_produces_output() {
    let mut h = harness(107);
    let output = h.output("short.mp4");

    h.recorder.start(SessionRequest::new(&output).with_device(107)).unwrap();
    thread::sleep(Duration::from_millis(1490));
    let report = h.recorder.stop().unwrap();

    assert!(report.frame_count < 90);
    assert!(report.frame_count >= 40, "got {} frames", report.frame_count);
    assert!(output.exists());
    assert_eq!(h.recorder.phase(), SessionPhase::Idle);
}

#[test]
fn recording_area_crops_frames_and_draws_pointer() {
    let screen = SyntheticScreenProvider {
        pointer: Some((4, 4)),
        ..SyntheticScreenProvider::default()
    };
    let mut h = harness_with(screen, SyntheticMic::new(108), RecordingEncoder::default());

    h.recorder.set_recording_area(Some(Rect::new(2, 2, 8, 6))).unwrap();
    assert_eq!(h.recorder.recording_area(), Some(Rect::new(2, 2, 8, 6)));

    h.recorder
        .start(SessionRequest::new(h.output("area.avi")).without_audio())
        .unwrap();
    assert!(h.recorder.set_recording_area(None).is_err());
    thread::sleep(Duration::from_millis(200));
    h.recorder.stop().unwrap();

    let log = h.encoder.log();
    assert!(log.frame_sizes.iter().all(|&s| s == (8, 6)));
}

#[test]
fn stop_handle_works_from_another_thread() {
    let mut h = harness(109);
    h.recorder
        .start(SessionRequest::new(h.output("handle.mp4")).with_device(109))
        .unwrap();

    let handle = h.recorder.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        let first = handle.request_stop();
        let second = handle.request_stop();
        (first, second)
    });

    assert!(h.recorder.wait_for_stop(Duration::from_secs(5)));
    assert_eq!(stopper.join().unwrap(), (true, false));
    assert_eq!(h.recorder.phase(), SessionPhase::Stopping);

    let report = h.recorder.stop().unwrap();
    assert!(report.frame_count > 0);
}

#[test]
fn toggle_pause_alternates() {
    let mut h = harness(110);
    assert!(h.recorder.toggle_pause().is_err());

    h.recorder
        .start(SessionRequest::new(h.output("toggle.mp4")).without_audio())
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(h.recorder.toggle_pause().unwrap(), SessionPhase::Paused);
    assert_eq!(h.recorder.status().pause_count, 1);
    assert_eq!(h.recorder.toggle_pause().unwrap(), SessionPhase::Recording);
    assert_eq!(h.recorder.status().pause_count, 1);
    thread::sleep(Duration::from_millis(100));

    // Stop while paused closes the open window
    h.recorder.pause().unwrap();
    thread::sleep(Duration::from_millis(100));
    let report = h.recorder.stop().unwrap();
    assert_eq!(report.pauses.len(), 2);
}

#[test]
fn report_sidecar_is_written_next_to_output() {
    let mut h = harness(111);
    let output = h.output("sidecar.mp4");
    h.recorder.start(SessionRequest::new(&output).with_device(111)).unwrap();
    thread::sleep(Duration::from_millis(300));
    let report = h.recorder.stop().unwrap();

    let saved = load_report(&report_path(&output)).unwrap();
    assert_eq!(saved.frame_count, report.frame_count);
    assert_eq!(saved.audio_sample_count, report.audio_sample_count);
    assert_eq!(saved.framerate, 30);
}

#[test]
fn status_reports_live_progress() {
    let mut h = harness(112);
    let idle = h.recorder.status();
    assert_eq!(idle.phase, SessionPhase::Idle);
    assert_eq!(idle.frame_count, 0);
    assert_eq!(idle.elapsed_seconds, 0.0);

    h.recorder
        .start(SessionRequest::new(h.output("status.mp4")).with_device(112))
        .unwrap();
    thread::sleep(Duration::from_millis(400));

    let live = h.recorder.status();
    assert_eq!(live.phase, SessionPhase::Recording);
    assert!(live.frame_count > 0);
    assert!(live.sample_count > 0);
    assert!(live.elapsed_seconds > 0.2);
    assert!((h.recorder.audio_level() - 0.25).abs() < 1e-6);
    assert!(live.failure.is_none());

    h.recorder.stop().unwrap();
    let after = h.recorder.status();
    assert_eq!(after.phase, SessionPhase::Idle);
    assert_eq!(after.frame_count, 0);
    assert_eq!(h.recorder.audio_level(), 0.0);
}

#[test]
fn immediate_stop_still_writes_the_first_frame() {
    let mut h = harness(113);
    let output = h.output("instant.mp4");

    h.recorder.start(SessionRequest::new(&output).without_audio()).unwrap();
    let report = h.recorder.stop().unwrap();

    assert!(report.frame_count >= 1);
    assert!(output.exists());
    assert_eq!(h.encoder.log().frame_timestamps[0], 0.0);
    assert_eq!(h.recorder.phase(), SessionPhase::Idle);
}

#[test]
fn immediate_stop_with_microphone_still_writes_output() {
    let mut h = harness(114);
    let output = h.output("instant_mic.mp4");

    h.recorder.start(SessionRequest::new(&output).with_device(114)).unwrap();
    let report = h.recorder.stop().unwrap();

    assert!(report.frame_count >= 1);
    assert_eq!(report.output, output);
    assert!(output.exists());
}
