use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "video")]
pub mod video;

/// Rectangle in absolute frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A decoded frame tagged with the time (seconds) it was sampled at.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    pub t: f64,
    pub image: RgbaImage,
}

/// Anything that can hand out decoded frames by timestamp.
///
/// Implementations own the underlying decoder; dropping the source releases it.
pub trait FrameSource {
    /// Frame shown at `t` seconds. `Ok(None)` means the stream has no frame
    /// there (typically past the end); `Err` means the source itself failed.
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        (**self).frame_at(t)
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        (**self).frame_at(t)
    }
}

/// Fixed-step sample times `start, start + 1/fps, ...` up to and including `end`.
#[derive(Debug, Clone)]
pub struct Timeline {
    start: f64,
    end: f64,
    step: f64,
    index: u64,
}

impl Iterator for Timeline {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.step <= 0.0 {
            return None;
        }
        // Multiply instead of accumulating so long runs don't drift
        let t = self.start + self.index as f64 * self.step;
        if t > self.end + 1e-9 {
            return None;
        }
        self.index += 1;
        Some(t)
    }
}

pub fn timeline(start: f64, end: f64, fps: f64) -> Timeline {
    let step = if fps > 0.0 && fps.is_finite() {
        1.0 / fps
    } else {
        0.0
    };
    Timeline {
        start,
        end,
        step,
        index: 0,
    }
}

/// Evenly spaced times across a window of `window_sec` centred on `center`.
/// Collapses to the centre alone when `count <= 1`. Times are clamped at zero.
pub fn window_times(center: f64, window_sec: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![center.max(0.0)];
    }
    let half = window_sec / 2.0;
    let step = window_sec / (count - 1) as f64;
    (0..count)
        .map(|i| (center - half + i as f64 * step).max(0.0))
        .collect()
}

/// Read every frame in the window around `center`. Samples the source cannot
/// produce are skipped; each one is an independent opportunity.
pub fn sample_window<S: FrameSource + ?Sized>(
    source: &mut S,
    center: f64,
    window_sec: f64,
    count: usize,
) -> Vec<TimestampedFrame> {
    let mut frames = Vec::with_capacity(count.max(1));
    for t in window_times(center, window_sec, count) {
        match source.frame_at(t) {
            Ok(Some(image)) => frames.push(TimestampedFrame { t, image }),
            Ok(None) => debug!("No frame at {:.3}s", t),
            Err(e) => debug!("Skipping sample at {:.3}s: {}", t, e),
        }
    }
    frames
}

/// Crop a pixel rectangle out of a frame, clamped to the frame bounds.
/// Returns `None` when nothing of the rectangle lies inside the frame.
pub fn crop_rect(frame: &RgbaImage, rect: &PixelRect) -> Option<RgbaImage> {
    let (w, h) = frame.dimensions();
    if rect.x >= w || rect.y >= h {
        return None;
    }
    let rw = rect.width.min(w - rect.x);
    let rh = rect.height.min(h - rect.y);
    if rw == 0 || rh == 0 {
        return None;
    }
    Some(image::imageops::crop_imm(frame, rect.x, rect.y, rw, rh).to_image())
}

/// In-memory frame source: frame `i` is shown from `i / fps` until the next one.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<RgbaImage>,
    fps: f64,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbaImage>, fps: f64) -> Self {
        Self { frames, fps }
    }

    pub fn duration(&self) -> f64 {
        if self.fps <= 0.0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.fps
    }
}

impl FrameSource for FrameSequence {
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        if self.fps <= 0.0 || t >= self.duration() {
            return Ok(None);
        }
        let index = (t.max(0.0) * self.fps + 1e-6).floor() as usize;
        Ok(self.frames.get(index).cloned())
    }
}
