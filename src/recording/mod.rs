/**
 * ============================================================================
 * RECORDING MODULE
 * ============================================================================
 *
 * PURPOSE: Synchronized screen + microphone capture engine
 *
 * SUBMODULES:
 * - types: Data structures and models
 * - config: Configuration persistence and validation
 * - clock: Wall-clock baseline shared by both producers
 * - pause: Session state machine, start gate, pause gate, counters
 * - buffer: Ordered frame/sample queues with bulk timestamp shift
 * - sync: Drift detection and correction between the two producers
 * - producer: Common producer interface and shared session context
 * - capture: Screen sources (scap) and frame conversion
 * - video: Fixed-cadence video producer, cropping and pointer overlay
 * - audio: Callback-driven audio producer, cpal input, level meter, self-test
 * - device: Exclusive audio device leases
 * - encoder: Media-encoder boundary and the FFmpeg implementation
 * - finalize: Intermediates, volume, mux or move into place
 * - storage: Scratch directory and session report sidecar
 * - manager: Recorder facade and lifecycle
 *
 * ARCHITECTURE:
 * 1. The video thread marks the baseline and releases the start gate
 * 2. Both producers timestamp as now - baseline - pause_accumulator
 * 3. Every sample feeds the sync monitor; drift beyond 50 ms shifts queued
 *    video frames toward the audio clock
 * 4. Stop joins both threads, then a single finalizer builds the output
 *
 * REQUIREMENTS:
 * - FFmpeg on PATH, or `ffmpeg_path` in the recorder config
 * - Screen recording permission (macOS)
 *
 * ============================================================================
 */

pub mod audio;
pub mod buffer;
pub mod capture;
pub mod clock;
pub mod config;
pub mod device;
pub mod encoder;
pub mod finalize;
pub mod manager;
pub mod pause;
pub mod producer;
pub mod storage;
pub mod sync;
pub mod types;
pub mod video;
