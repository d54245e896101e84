//! Animated image model: full-canvas RGBA frames plus animation metadata
//!
//! GIF metadata (delays, loop count, disposal, transparency) is scattered across
//! per-frame extensions in the container. It is read once at decode time into
//! [`AnimationMeta`] and every transform carries it forward explicitly.
//!
//! **Used by**: codec (decode/encode), transform (per-frame ops), pipeline
//!
//! # Invariants
//!
//! - An [`AnimatedImage`] holds at least one frame
//! - All frames of one animation share width/height
//! - Every frame has `duration_ms > 0` (missing delays become [`DEFAULT_FRAME_DURATION_MS`])

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// Duration used when the source frame carries no delay
pub const DEFAULT_FRAME_DURATION_MS: u32 = 100;

/// Alpha values below this are written as fully transparent (GIF alpha is 1-bit)
pub const ALPHA_THRESHOLD: u8 = 128;

/// How a renderer treats the canvas after a frame is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMode {
    Unspecified, // 0: renderer decides
    Keep,        // 1: leave frame in place
    #[default]
    Background,  // 2: clear frame area before next draw
    Previous,    // 3: restore canvas to pre-frame state
}

impl DisposalMode {
    /// True if the canvas is cleared (or restored) between frames
    pub fn clears_canvas(self) -> bool {
        matches!(self, DisposalMode::Background | DisposalMode::Previous)
    }
}

/// Global animation attributes, populated once at decode time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationMeta {
    /// 0 = loop forever, N = loop N times
    pub loop_count: u16,
    pub disposal: DisposalMode,
    /// Palette index marked transparent in the source, if any
    pub transparency_index: Option<u8>,
}

impl Default for AnimationMeta {
    fn default() -> Self {
        Self {
            loop_count: 0,
            disposal: DisposalMode::Background,
            transparency_index: None,
        }
    }
}

/// Single full-canvas RGBA frame with its display duration
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbaImage,
    duration_ms: u32,
}

impl Frame {
    /// Create frame; zero duration falls back to [`DEFAULT_FRAME_DURATION_MS`]
    pub fn new(image: RgbaImage, duration_ms: u32) -> Self {
        let duration_ms = if duration_ms == 0 { DEFAULT_FRAME_DURATION_MS } else { duration_ms };
        Self { image, duration_ms }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get resolution as tuple
    pub fn resolution(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Replace pixels, keeping the duration
    pub fn with_image(&self, image: RgbaImage) -> Self {
        Self { image, duration_ms: self.duration_ms }
    }

    /// True if any pixel would be written as transparent
    pub fn has_transparency(&self) -> bool {
        self.image.pixels().any(|p| p[3] < ALPHA_THRESHOLD)
    }
}

/// Ordered frame sequence plus global metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedImage {
    frames: Vec<Frame>,
    meta: AnimationMeta,
}

impl AnimatedImage {
    /// Build an animation, enforcing the non-empty and uniform-size invariants
    pub fn new(frames: Vec<Frame>, meta: AnimationMeta) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(PipelineError::Transform("animation has no frames".into()));
        };
        let size = first.resolution();
        if let Some((i, bad)) = frames.iter().enumerate().find(|(_, f)| f.resolution() != size) {
            return Err(PipelineError::Transform(format!(
                "frame {} is {}x{}, expected {}x{}",
                i,
                bad.width(),
                bad.height(),
                size.0,
                size.1
            )));
        }
        Ok(Self { frames, meta })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn meta(&self) -> AnimationMeta {
        self.meta
    }

    pub fn with_meta(mut self, meta: AnimationMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> u32 {
        self.frames[0].width()
    }

    pub fn height(&self) -> u32 {
        self.frames[0].height()
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.frames[0].resolution()
    }

    /// Per-frame durations in display order
    pub fn durations(&self) -> Vec<u32> {
        self.frames.iter().map(Frame::duration_ms).collect()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.duration_ms)).sum()
    }

    /// Sum of frame durations in seconds, rounded to 2 decimals
    pub fn total_duration_secs(&self) -> f64 {
        // ms / 10 = centiseconds, round there to get 2 decimals in seconds
        (self.total_duration_ms() as f64 / 10.0).round() / 100.0
    }

    pub fn has_transparency(&self) -> bool {
        self.frames.iter().any(Frame::has_transparency)
    }

    /// Apply a per-frame transform on the rayon pool; order and metadata are kept
    pub fn map_frames<F>(&self, op: F) -> Result<Self>
    where
        F: Fn(&Frame) -> Frame + Sync + Send,
    {
        let frames: Vec<Frame> = self.frames.par_iter().map(op).collect();
        Self::new(frames, self.meta)
    }
}

/// Synthetic animations for tests across the crate
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use image::Rgba;

    pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    pub const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// Frame filled with one color
    pub fn solid(width: u32, height: u32, color: Rgba<u8>, duration_ms: u32) -> Frame {
        Frame::new(RgbaImage::from_pixel(width, height, color), duration_ms)
    }

    /// Frame with left half `left` and right half `right`
    pub fn halves(width: u32, height: u32, left: Rgba<u8>, right: Rgba<u8>, duration_ms: u32) -> Frame {
        let image = RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { left } else { right });
        Frame::new(image, duration_ms)
    }

    /// Frame with a distinct color per column band so flips/swaps are detectable
    pub fn gradient(width: u32, height: u32, seed: u8, duration_ms: u32) -> Frame {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            if x == 0 && y == 0 {
                CLEAR
            } else {
                Rgba([(x * 16) as u8 ^ seed, (y * 16) as u8, 200u8.wrapping_sub(seed), 255])
            }
        });
        Frame::new(image, duration_ms)
    }

    /// Animation with default metadata
    pub fn animation(frames: Vec<Frame>) -> AnimatedImage {
        AnimatedImage::new(frames, AnimationMeta::default()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    /// Test: Zero duration falls back to default
    /// Validates: Frames always carry a positive duration
    #[test]
    fn test_default_duration() {
        let frame = solid(4, 4, RED, 0);
        assert_eq!(frame.duration_ms(), DEFAULT_FRAME_DURATION_MS);

        let frame = solid(4, 4, RED, 70);
        assert_eq!(frame.duration_ms(), 70);
    }

    /// Test: Empty and mixed-size frame lists are rejected
    /// Validates: AnimatedImage invariants
    #[test]
    fn test_invariants() {
        assert!(AnimatedImage::new(vec![], AnimationMeta::default()).is_err());

        let mixed = vec![solid(4, 4, RED, 100), solid(4, 5, RED, 100)];
        let err = AnimatedImage::new(mixed, AnimationMeta::default()).unwrap_err();
        assert!(err.to_string().contains("frame 1"));
    }

    /// Test: Total duration is summed and rounded to 2 decimals
    #[test]
    fn test_total_duration() {
        let anim = animation((0..10).map(|_| solid(2, 2, RED, 100)).collect());
        assert_eq!(anim.total_duration_ms(), 1000);
        assert_eq!(anim.total_duration_secs(), 1.0);

        let anim = animation(vec![solid(2, 2, RED, 70), solid(2, 2, RED, 80), solid(2, 2, RED, 1333)]);
        assert_eq!(anim.total_duration_secs(), 1.48);

        let single = animation(vec![solid(2, 2, RED, 0)]);
        assert_eq!(single.total_duration_secs(), 0.1);
    }

    /// Test: map_frames keeps order, durations and metadata
    #[test]
    fn test_map_frames_preserves_order() {
        let meta = AnimationMeta { loop_count: 3, disposal: DisposalMode::Previous, transparency_index: Some(7) };
        let anim = AnimatedImage::new(
            vec![solid(2, 2, RED, 10), solid(2, 2, GREEN, 20), solid(2, 2, BLUE, 30)],
            meta,
        )
        .unwrap();

        let mapped = anim.map_frames(|f| f.clone()).unwrap();
        assert_eq!(mapped.durations(), vec![10, 20, 30]);
        assert_eq!(mapped.meta(), meta);
        assert_eq!(mapped.frames()[1].image().get_pixel(0, 0), &GREEN);
    }

    #[test]
    fn test_transparency_detection() {
        assert!(!solid(2, 2, RED, 100).has_transparency());
        assert!(solid(2, 2, CLEAR, 100).has_transparency());
        assert!(gradient(4, 4, 0, 100).has_transparency());
    }
}
