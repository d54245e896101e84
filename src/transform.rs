//! Per-frame geometry and color transforms.
//!
//! All operations take a [`Frame`] by reference and return a new frame with the
//! same duration. Only the pixel buffer changes.
//!
//! | Op | Output size | Notes |
//! |----|-------------|-------|
//! | [`split`] | W/2 x H | caller checks [`is_side_by_side`] first |
//! | [`resize`] | target | Lanczos3 on premultiplied alpha |
//! | [`permute_channels`] | same | alpha untouched |
//! | [`flip_horizontal`] | same | its own inverse |

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, Rgba32FImage, RgbaImage};

use crate::error::{PipelineError, Result};
use crate::frame::Frame;

/// Half of a side-by-side image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn all() -> &'static [Side] {
        &[Side::Left, Side::Right]
    }

    /// Suffix used in display filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if the image is exactly twice as wide as it is tall
pub fn is_side_by_side(width: u32, height: u32) -> bool {
    height > 0 && u64::from(width) == 2 * u64::from(height)
}

/// Crop the left or right half of a side-by-side frame
pub fn split(frame: &Frame, side: Side) -> Frame {
    let (width, height) = frame.resolution();
    let half = width / 2;
    let x = match side {
        Side::Left => 0,
        Side::Right => half,
    };
    let cropped = imageops::crop_imm(frame.image(), x, 0, half, height).to_image();
    frame.with_image(cropped)
}

/// Resample to exactly `width` x `height` with Lanczos3
///
/// Color is premultiplied by alpha before filtering and divided back afterwards,
/// so fully transparent pixels never bleed their (meaningless) RGB into edges.
pub fn resize(frame: &Frame, width: u32, height: u32) -> Frame {
    if frame.resolution() == (width, height) {
        return frame.clone();
    }

    let src = frame.image();
    let premultiplied: Rgba32FImage = ImageBuffer::from_fn(src.width(), src.height(), |x, y| {
        let p = src.get_pixel(x, y);
        let a = f32::from(p[3]) / 255.0;
        Rgba([
            f32::from(p[0]) / 255.0 * a,
            f32::from(p[1]) / 255.0 * a,
            f32::from(p[2]) / 255.0 * a,
            a,
        ])
    });

    let resized = imageops::resize(&premultiplied, width, height, FilterType::Lanczos3);

    let out = RgbaImage::from_fn(width, height, |x, y| {
        let p = resized.get_pixel(x, y);
        let a = p[3].clamp(0.0, 1.0);
        if a <= f32::EPSILON {
            return Rgba([0, 0, 0, 0]);
        }
        let unmul = |c: f32| ((c / a).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([unmul(p[0]), unmul(p[1]), unmul(p[2]), (a * 255.0).round() as u8])
    });
    frame.with_image(out)
}

/// Mirror pixel columns
pub fn flip_horizontal(frame: &Frame) -> Frame {
    frame.with_image(imageops::flip_horizontal(frame.image()))
}

/// Color channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    fn letter(self) -> char {
        match self {
            Channel::Red => 'r',
            Channel::Green => 'g',
            Channel::Blue => 'b',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'r' => Some(Channel::Red),
            'g' => Some(Channel::Green),
            'b' => Some(Channel::Blue),
            _ => None,
        }
    }
}

/// Bijection over {R, G, B}: output channel `i` reads input channel `self.0[i]`
///
/// Can only be built through [`ChannelMap::parse`], so every value is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap([Channel; 3]);

impl ChannelMap {
    pub const IDENTITY: ChannelMap = ChannelMap([Channel::Red, Channel::Green, Channel::Blue]);

    /// Parse a 3-letter permutation of "rgb" (case-insensitive), e.g. "gbr"
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || PipelineError::InvalidMapping(s.to_string());

        let mut chars = s.chars();
        let mut channels = [Channel::Red; 3];
        for slot in channels.iter_mut() {
            *slot = chars.next().and_then(Channel::from_letter).ok_or_else(invalid)?;
        }
        if chars.next().is_some() {
            return Err(invalid());
        }

        let [a, b, c] = channels;
        if a == b || b == c || a == c {
            return Err(invalid());
        }
        Ok(ChannelMap(channels))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Source channel index for each output channel
    pub fn indices(&self) -> [usize; 3] {
        [self.0[0].index(), self.0[1].index(), self.0[2].index()]
    }
}

impl FromStr for ChannelMap {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        ChannelMap::parse(s)
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{}", c.letter()))
    }
}

/// Reassign color channels; alpha passes through unchanged
pub fn permute_channels(frame: &Frame, map: ChannelMap) -> Frame {
    if map.is_identity() {
        return frame.clone();
    }
    let [r, g, b] = map.indices();
    let mut out = frame.image().clone();
    for px in out.pixels_mut() {
        let src = *px;
        *px = Rgba([src[r], src[g], src[b], src[3]]);
    }
    frame.with_image(out)
}
