/**
 * ============================================================================
 * VIDEO CAPTURE MODULE
 * ============================================================================
 *
 * PURPOSE: Fixed-cadence screen-frame producer
 *
 * LOOP:
 * - tick 0 is grabbed right after the baseline is marked, timestamp 0
 * - next_tick = baseline + frame_count * d + pause_accumulator
 * - now >= next_tick: grab, crop to the recording area, round the size down
 *   to even, overlay the pointer,
 *   timestamp = now - baseline - pause_accumulator, push, count
 * - now <  next_tick: sleep at most half a millisecond
 * - Paused: block on the pause gate
 *
 * The source is opened before the baseline is marked so capturer start-up
 * latency never lands inside the timeline. Grab failures end the session.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::capture::{ScreenProvider, ScreenSettings, ScreenSource};
use crate::recording::producer::{Producer, ProducerStats, SessionContext, join_producer};
use crate::recording::types::{RawImage, Rect, StreamKind, SyncSample, VideoFrame};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Upper bound on one idle sleep between ticks
const MAX_IDLE_SLEEP: Duration = Duration::from_micros(500);

const CURSOR_RADIUS: i32 = 10;
const CURSOR_COLOR: [u8; 3] = [0, 255, 0];

pub struct VideoCapture {
    provider: Arc<dyn ScreenProvider>,
    settings: ScreenSettings,
    area: Option<Rect>,
    frame_duration: Duration,
    handle: Option<JoinHandle<ProducerStats>>,
}

impl VideoCapture {
    pub fn new(
        provider: Arc<dyn ScreenProvider>,
        settings: ScreenSettings,
        area: Option<Rect>,
    ) -> Self {
        let frame_duration = Duration::from_secs_f64(1.0 / settings.fps.max(1) as f64);
        Self {
            provider,
            settings,
            area,
            frame_duration,
            handle: None,
        }
    }
}

impl Producer for VideoCapture {
    fn kind(&self) -> StreamKind {
        StreamKind::Video
    }

    fn start(&mut self, ctx: Arc<SessionContext>) -> Result<()> {
        if self.handle.is_some() {
            return Err(RecorderError::State("Video producer already started".to_string()));
        }

        let provider = self.provider.clone();
        let settings = self.settings.clone();
        let area = self.area;
        let frame_duration = self.frame_duration;

        let handle = thread::Builder::new()
            .name("syncrec-video".to_string())
            .spawn(move || {
                let result = provider
                    .open(&settings)
                    .and_then(|mut source| {
                        run_video_loop(source.as_mut(), &ctx, area, settings.show_cursor, frame_duration)
                    });

                match result {
                    Ok(stats) => {
                        log::info!(
                            "Video producer finished: {} frames, last timestamp {:.3}s",
                            stats.units,
                            stats.last_timestamp
                        );
                        stats
                    }
                    Err(e) => {
                        ctx.coordinator.fail(e);
                        ProducerStats {
                            kind: StreamKind::Video,
                            units: ctx.coordinator.frame_count(),
                            last_timestamp: ctx.sync.last_video(),
                        }
                    }
                }
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<ProducerStats> {
        join_producer(StreamKind::Video, self.handle.take())
    }
}

// The schedule loop; returns when a stop is requested
pub fn run_video_loop(
    source: &mut dyn ScreenSource,
    ctx: &SessionContext,
    area: Option<Rect>,
    draw_cursor: bool,
    frame_duration: Duration,
) -> Result<ProducerStats> {
    let coordinator = &ctx.coordinator;
    coordinator.mark_baseline(Instant::now());
    log::info!(
        "Video producer started ({:.1} fps, area {:?})",
        1.0 / frame_duration.as_secs_f64(),
        area
    );

    let mut stats = ProducerStats::empty(StreamKind::Video);

    // Tick 0 sits on the baseline and is captured even if a stop is already pending
    let image = source.grab()?;
    let pointer = if draw_cursor { source.pointer_position() } else { None };
    let mut frame_count = push_frame(ctx, compose_frame(image, area, pointer, 0.0), &mut stats);

    while !coordinator.should_stop() {
        if coordinator.is_paused() {
            if !coordinator.wait_while_paused() {
                break;
            }
            continue;
        }

        let Some(next_tick) = coordinator.next_tick(frame_count, frame_duration) else {
            break;
        };

        let now = Instant::now();
        if now < next_tick {
            thread::sleep((next_tick - now).min(MAX_IDLE_SLEEP));
            continue;
        }

        let image = source.grab()?;
        let pointer = if draw_cursor { source.pointer_position() } else { None };

        // Paused or stopped between the tick check and here: drop the grab
        let Some(timestamp) = coordinator.timestamp_at(now) else {
            continue;
        };

        frame_count = push_frame(ctx, compose_frame(image, area, pointer, timestamp), &mut stats);
    }

    Ok(stats)
}

// Buffer one frame, feed the drift monitor, count it
fn push_frame(ctx: &SessionContext, frame: VideoFrame, stats: &mut ProducerStats) -> u64 {
    let timestamp = frame.timestamp;
    ctx.frames.push(frame);
    ctx.sync.record(
        SyncSample {
            kind: StreamKind::Video,
            timestamp,
        },
        &ctx.frames,
    );

    let frame_count = ctx.coordinator.record_video_frame();
    stats.units = frame_count;
    stats.last_timestamp = timestamp;
    frame_count
}

// Crop, then overlay the pointer translated into area-relative coordinates
pub fn compose_frame(
    image: RawImage,
    area: Option<Rect>,
    pointer: Option<(i32, i32)>,
    timestamp: f64,
) -> VideoFrame {
    let (image, origin) = match area {
        Some(rect) => {
            let cropped = crop(&image, rect);
            // A clamped-away area leaves the full image in place
            if cropped.width == image.width && cropped.height == image.height {
                (image, (0, 0))
            } else {
                (cropped, (rect.x as i32, rect.y as i32))
            }
        }
        None => (image, (0, 0)),
    };
    let mut image = even_dimensions(image);

    if let Some((px, py)) = pointer {
        draw_cursor_marker(&mut image, px - origin.0, py - origin.1);
    }

    VideoFrame {
        timestamp,
        width: image.width,
        height: image.height,
        pixels: image.pixels,
    }
}

// Crop to `rect`, clamped to the image bounds
pub fn crop(image: &RawImage, rect: Rect) -> RawImage {
    let x0 = rect.x.min(image.width);
    let y0 = rect.y.min(image.height);
    let x1 = rect.x.saturating_add(rect.width).min(image.width);
    let y1 = rect.y.saturating_add(rect.height).min(image.height);

    if x1 <= x0 || y1 <= y0 {
        log::warn!("Recording area {:?} lies outside the {}x{} screen", rect, image.width, image.height);
        return image.clone();
    }

    let row_bytes = image.width as usize * 3;
    let (w, h) = (x1 - x0, y1 - y0);
    let mut pixels = Vec::with_capacity(w as usize * h as usize * 3);
    for y in y0..y1 {
        let start = y as usize * row_bytes + x0 as usize * 3;
        pixels.extend_from_slice(&image.pixels[start..start + w as usize * 3]);
    }

    RawImage {
        width: w,
        height: h,
        pixels,
    }
}

// yuv420p needs even width and height; drop the odd last column or row
fn even_dimensions(image: RawImage) -> RawImage {
    let (w, h) = (image.width & !1, image.height & !1);
    if (w, h) == (image.width, image.height) || w == 0 || h == 0 {
        return image;
    }
    crop(&image, Rect::new(0, 0, w, h))
}

fn put_pixel(image: &mut RawImage, x: i32, y: i32, rgb: [u8; 3]) {
    if x < 0 || y < 0 || x >= image.width as i32 || y >= image.height as i32 {
        return;
    }
    let idx = (y as usize * image.width as usize + x as usize) * 3;
    image.pixels[idx..idx + 3].copy_from_slice(&rgb);
}

// Ring of radius 10 plus a four-armed crosshair, both two pixels thick
pub fn draw_cursor_marker(image: &mut RawImage, x: i32, y: i32) {
    if x < 0 || y < 0 || x >= image.width as i32 || y >= image.height as i32 {
        return;
    }

    let r = CURSOR_RADIUS;
    for dy in -(r + 1)..=(r + 1) {
        for dx in -(r + 1)..=(r + 1) {
            let d = ((dx * dx + dy * dy) as f64).sqrt();
            if (d - r as f64).abs() <= 1.0 {
                put_pixel(image, x + dx, y + dy, CURSOR_COLOR);
            }
        }
    }

    for k in 0..=r {
        for t in 0..2 {
            put_pixel(image, x + t, y - k, CURSOR_COLOR);
            put_pixel(image, x + t, y + k, CURSOR_COLOR);
            put_pixel(image, x - k, y + t, CURSOR_COLOR);
            put_pixel(image, x + k, y + t, CURSOR_COLOR);
        }
    }
}
