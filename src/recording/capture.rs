/**
 * ============================================================================
 * SCREEN CAPTURE MODULE
 * ============================================================================
 *
 * PURPOSE: Screen-grab sources for the video producer
 *
 * FUNCTIONALITY:
 * - ScreenSource / ScreenProvider seams so the producer can run against any
 *   grabber (scap in production, scripted sources in tests)
 * - Platform support and permission checks
 * - Display enumeration
 * - Conversion of scap frames (BGRA, BGRx, RGB, ...) into packed RGB
 *
 * Sources are opened on the video thread itself; platform capturers are not
 * required to be Send.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use crate::recording::types::RawImage;
use scap::{
    Target,
    capturer::{Capturer, Options},
    frame::{Frame, FrameType},
};
use std::time::{Duration, Instant};

// How the video producer wants its source configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSettings {
    pub display_index: u32,
    pub fps: u32,
    pub show_cursor: bool,
}

// One full-screen grab per call
pub trait ScreenSource {
    fn grab(&mut self) -> Result<RawImage>;

    // Pointer position in screen coordinates, when the source tracks it
    fn pointer_position(&mut self) -> Option<(i32, i32)> {
        None
    }
}

pub trait ScreenProvider: Send + Sync {
    fn open(&self, settings: &ScreenSettings) -> Result<Box<dyn ScreenSource>>;
}

// =============================================================================
// Platform Support Checks
// =============================================================================

pub fn is_supported() -> bool {
    scap::is_supported()
}

pub fn has_permission() -> bool {
    scap::has_permission()
}

// =============================================================================
// Display Enumeration
// =============================================================================

pub fn get_display_targets() -> Vec<Target> {
    scap::get_all_targets()
        .into_iter()
        .filter(|t| matches!(t, Target::Display(_)))
        .collect()
}

// =============================================================================
// Frame Conversion
// =============================================================================

// Packed RGB from any of the byte layouts scap delivers
pub fn frame_to_rgb(frame: Frame) -> Option<RawImage> {
    let (width, height, data, layout) = match frame {
        Frame::BGRA(f) => (f.width as u32, f.height as u32, f.data, [2, 1, 0, 4]),
        Frame::BGR0(f) => (f.width as u32, f.height as u32, f.data, [2, 1, 0, 4]),
        Frame::BGRx(f) => (f.width as u32, f.height as u32, f.data, [2, 1, 0, 4]),
        Frame::RGBx(f) => (f.width as u32, f.height as u32, f.data, [0, 1, 2, 4]),
        Frame::XBGR(f) => (f.width as u32, f.height as u32, f.data, [3, 2, 1, 4]),
        Frame::RGB(f) => (f.width as u32, f.height as u32, f.data, [0, 1, 2, 3]),
        _ => return None,
    };

    Some(RawImage {
        width,
        height,
        pixels: pack_rgb(&data, layout),
    })
}

// layout = [r offset, g offset, b offset, bytes per pixel]
fn pack_rgb(data: &[u8], layout: [usize; 4]) -> Vec<u8> {
    let [r, g, b, stride] = layout;
    let mut out = Vec::with_capacity(data.len() / stride * 3);
    for px in data.chunks_exact(stride) {
        out.extend_from_slice(&[px[r], px[g], px[b]]);
    }
    out
}

// =============================================================================
// scap Source
// =============================================================================

pub struct ScapScreen {
    capturer: Capturer,
    display_index: u32,
    last_good: RawImage,
    empty_frame_count: u64,
}

impl ScapScreen {
    pub fn open(settings: &ScreenSettings) -> Result<Self> {
        if !is_supported() {
            return Err(RecorderError::Device(
                "Screen capture not supported on this platform".to_string(),
            ));
        }

        if !has_permission() {
            return Err(RecorderError::Device(
                "Screen recording permission not granted. On macOS, enable in System Preferences > Privacy & Security > Screen Recording".to_string(),
            ));
        }

        let target = get_display_targets()
            .into_iter()
            .nth(settings.display_index as usize)
            .ok_or_else(|| {
                RecorderError::Device(format!("Display {} not found", settings.display_index))
            })?;

        log::info!("Creating capturer for display {}", settings.display_index);

        let options = Options {
            fps: settings.fps,
            target: Some(target),
            show_cursor: settings.show_cursor,
            show_highlight: false,
            excluded_targets: None,
            output_type: FrameType::BGRAFrame,
            output_resolution: scap::capturer::Resolution::Captured,
            ..Default::default()
        };

        let mut capturer = Capturer::build(options).map_err(|e| {
            RecorderError::Device(format!(
                "Failed to create capturer for display {}: {:?}",
                settings.display_index, e
            ))
        })?;
        capturer.start_capture();

        let first = wait_for_first_frame(&mut capturer, settings.display_index)?;
        log::info!(
            "Display {}: Capture initialized: {}x{}",
            settings.display_index,
            first.width,
            first.height
        );

        Ok(Self {
            capturer,
            display_index: settings.display_index,
            last_good: first,
            empty_frame_count: 0,
        })
    }
}

impl ScreenSource for ScapScreen {
    fn grab(&mut self) -> Result<RawImage> {
        let frame = self.capturer.get_next_frame().map_err(|e| {
            RecorderError::Device(format!("Display {}: capture error: {:?}", self.display_index, e))
        })?;

        match frame_to_rgb(frame) {
            Some(image) if !image.pixels.is_empty() && image.pixels.len() == image.expected_len() => {
                self.last_good = image.clone();
                Ok(image)
            }
            // Empty or unexpected frames from scap: repeat the previous grab
            _ => {
                self.empty_frame_count += 1;
                Ok(self.last_good.clone())
            }
        }
    }
}

impl Drop for ScapScreen {
    fn drop(&mut self) {
        if self.empty_frame_count > 0 {
            log::info!(
                "Display {}: Reused previous frame {} times (empty frames from scap)",
                self.display_index,
                self.empty_frame_count
            );
        }
        self.capturer.stop_capture();
    }
}

// Wait for the first frame; a capturer that never delivers is a device failure
fn wait_for_first_frame(capturer: &mut Capturer, display_index: u32) -> Result<RawImage> {
    let start = Instant::now();
    let timeout = Duration::from_secs(15);
    let mut attempt = 0;

    while start.elapsed() < timeout {
        attempt += 1;

        match capturer.get_next_frame() {
            Ok(frame) => {
                if let Some(image) = frame_to_rgb(frame).filter(|i| !i.pixels.is_empty()) {
                    log::info!(
                        "Display {}: Got first frame after {} attempts: {}x{}",
                        display_index,
                        attempt,
                        image.width,
                        image.height
                    );
                    return Ok(image);
                }
            }
            Err(_) => {
                if attempt % 50 == 0 {
                    log::warn!(
                        "Display {}: Still waiting for first frame (attempt {}, {:.1}s elapsed)",
                        display_index,
                        attempt,
                        start.elapsed().as_secs_f32()
                    );
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }

    Err(RecorderError::Device(format!(
        "Display {}: Timeout waiting for first frame after {:.1}s. Check screen recording permissions.",
        display_index,
        timeout.as_secs_f32()
    )))
}

// Production provider: the scap capturer for the requested display
#[derive(Debug, Default, Clone, Copy)]
pub struct ScapProvider;

impl ScreenProvider for ScapProvider {
    fn open(&self, settings: &ScreenSettings) -> Result<Box<dyn ScreenSource>> {
        Ok(Box::new(ScapScreen::open(settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bgra_to_rgb() {
        let bgra = [10, 20, 30, 255, 1, 2, 3, 0];
        assert_eq!(pack_rgb(&bgra, [2, 1, 0, 4]), vec![30, 20, 10, 3, 2, 1]);
    }

    #[test]
    fn test_pack_xbgr_to_rgb() {
        let xbgr = [0, 7, 8, 9];
        assert_eq!(pack_rgb(&xbgr, [3, 2, 1, 4]), vec![9, 8, 7]);
    }

    #[test]
    fn test_pack_rgb_passthrough() {
        let rgb = [1, 2, 3, 4, 5, 6];
        assert_eq!(pack_rgb(&rgb, [0, 1, 2, 3]), rgb.to_vec());
    }
}
