//! GIF codec adapter: container bytes <-> [`AnimatedImage`]
//!
//! # Purpose
//!
//! Wraps the `gif` crate so the rest of the crate only sees full-canvas RGBA frames
//! and an explicit [`AnimationMeta`]. No I/O happens here; callers own files.
//!
//! # Decoding
//!
//! GIF frames are sub-rectangles drawn onto a logical screen. Each source frame is
//! composited onto a persistent RGBA canvas honoring its offset, transparency and
//! disposal method, and the canvas is snapshotted after every draw:
//!
//! ```text
//! canvas ──draw(frame N)──▶ snapshot N ──dispose(N)──▶ canvas ──draw(frame N+1)──▶ ...
//!           Keep/Any: leave pixels
//!           Background: clear frame rect to transparent
//!           Previous: restore canvas saved before draw
//! ```
//!
//! Decoding stops with an error once the snapshots would exceed [`MAX_DECODED_BYTES`].
//!
//! Global metadata comes from the container: NETSCAPE loop count (absent = 0 = forever),
//! the first frame's disposal (unspecified = Background), the first transparent index.
//!
//! # Encoding
//!
//! Frames with <=256 colors get an exact palette (`gif::Frame::from_rgba_speed`). Larger
//! frames go through NeuQuant; when they hold transparent pixels the opaque ones are
//! quantized to 255 colors and slot 255 is kept for transparency. Alpha is binarized at
//! [`ALPHA_THRESHOLD`]. Every frame gets the
//! animation's disposal and its own delay; the source transparency index is pinned
//! by reordering the frame palette.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Read;

use color_quant::NeuQuant;
use image::{Rgba, RgbaImage};
use log::debug;

use crate::error::{PipelineError, Result};
use crate::frame::{ALPHA_THRESHOLD, AnimatedImage, AnimationMeta, DisposalMode, Frame};

/// NeuQuant speed for frames with more than 256 colors (1 = best, 30 = fastest)
pub const DEFAULT_ENCODE_SPEED: i32 = 10;

/// Largest logical screen accepted (4096 x 4096); the canvas is allocated up front
pub const MAX_SCREEN_PIXELS: u64 = 4096 * 4096;

/// Budget for all composited frames of one animation (each frame is a full canvas)
pub const MAX_DECODED_BYTES: u64 = 1024 * 1024 * 1024;

/// Palette slot reserved for alpha-0 pixels when quantizing with NeuQuant
const TRANSPARENT_SLOT: u8 = 255;

/// Decode GIF bytes into full-canvas frames
pub fn decode(bytes: &[u8]) -> Result<AnimatedImage> {
    decode_from(bytes)
}

/// Decode a GIF from any reader (e.g. a staged upload file)
pub fn decode_from<R: Read>(reader: R) -> Result<AnimatedImage> {
    decode_with_budget(reader, MAX_DECODED_BYTES)
}

fn decode_with_budget<R: Read>(reader: R, max_bytes: u64) -> Result<AnimatedImage> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(reader)?;

    let (screen_w, screen_h) = (u32::from(decoder.width()), u32::from(decoder.height()));
    if screen_w == 0 || screen_h == 0 {
        return Err(PipelineError::Decode(format!("empty logical screen {}x{}", screen_w, screen_h)));
    }
    if u64::from(screen_w) * u64::from(screen_h) > MAX_SCREEN_PIXELS {
        return Err(PipelineError::Decode(format!("logical screen {}x{} is too large", screen_w, screen_h)));
    }

    let frame_bytes = u64::from(screen_w) * u64::from(screen_h) * 4;
    let mut canvas = RgbaImage::new(screen_w, screen_h);
    let mut frames = Vec::new();
    let mut disposal: Option<gif::DisposalMethod> = None;
    let mut transparency_index: Option<u8> = None;

    while let Some(src) = decoder.read_next_frame()? {
        if (frames.len() as u64 + 1) * frame_bytes > max_bytes {
            return Err(PipelineError::Decode(format!(
                "decoded frames exceed {} MiB after {} frames of {}x{}",
                max_bytes / (1024 * 1024),
                frames.len(),
                screen_w,
                screen_h
            )));
        }
        disposal.get_or_insert(src.dispose);
        if transparency_index.is_none() {
            transparency_index = src.transparent;
        }

        let saved = (src.dispose == gif::DisposalMethod::Previous).then(|| canvas.clone());
        let rect = draw_frame(&mut canvas, src);
        frames.push(Frame::new(canvas.clone(), u32::from(src.delay) * 10));

        match src.dispose {
            gif::DisposalMethod::Background => clear_rect(&mut canvas, rect),
            gif::DisposalMethod::Previous => {
                if let Some(saved) = saved {
                    canvas = saved;
                }
            }
            _ => {}
        }
    }

    if frames.is_empty() {
        return Err(PipelineError::Decode("file contains no frames".into()));
    }

    let loop_count = match decoder.repeat() {
        gif::Repeat::Infinite => 0,
        gif::Repeat::Finite(n) => n,
    };
    let meta = AnimationMeta {
        loop_count,
        disposal: disposal.map(from_gif_disposal).unwrap_or_default(),
        transparency_index,
    };

    debug!(
        "Decoded GIF {}x{}: {} frames, loop={}, disposal={:?}, transparent={:?}",
        screen_w,
        screen_h,
        frames.len(),
        meta.loop_count,
        meta.disposal,
        meta.transparency_index
    );

    AnimatedImage::new(frames, meta).map_err(|e| PipelineError::Decode(e.to_string()))
}

/// Encode frames with the default quantizer speed
pub fn encode(animation: &AnimatedImage) -> Result<Vec<u8>> {
    encode_with_speed(animation, DEFAULT_ENCODE_SPEED)
}

/// Encode frames into an animated GIF
///
/// Preserves per-frame delays, loop count, disposal mode and transparency index.
pub fn encode_with_speed(animation: &AnimatedImage, speed: i32) -> Result<Vec<u8>> {
    let (width, height) = animation.resolution();
    let width = u16::try_from(width)
        .map_err(|_| PipelineError::Encode(format!("width {} exceeds GIF limit", width)))?;
    let height = u16::try_from(height)
        .map_err(|_| PipelineError::Encode(format!("height {} exceeds GIF limit", height)))?;
    let speed = speed.clamp(1, 30);
    let meta = animation.meta();

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[])?;
        encoder.set_repeat(to_gif_repeat(meta.loop_count))?;

        for frame in animation.frames() {
            let mut rgba = binarize_alpha(frame.image());
            let mut gif_frame = quantize(width, height, &mut rgba, speed);
            gif_frame.delay = delay_centis(frame.duration_ms());
            gif_frame.dispose = to_gif_disposal(meta.disposal);
            if let Some(index) = meta.transparency_index {
                pin_transparent_index(&mut gif_frame, index);
            }
            encoder.write_frame(&gif_frame)?;
        }
        // Trailer is written when the encoder drops
    }

    debug!(
        "Encoded GIF {}x{}: {} frames, {} bytes",
        width,
        height,
        animation.frame_count(),
        out.len()
    );
    Ok(out)
}

/// Pixel rectangle (clipped to canvas) covered by one source frame
#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// Draw non-transparent pixels of `src` onto `canvas`, returning the covered rect
fn draw_frame(canvas: &mut RgbaImage, src: &gif::Frame<'_>) -> Rect {
    let (left, top) = (u32::from(src.left), u32::from(src.top));
    let (fw, fh) = (u32::from(src.width), u32::from(src.height));
    let rect = Rect {
        x: left.min(canvas.width()),
        y: top.min(canvas.height()),
        w: fw.min(canvas.width().saturating_sub(left)),
        h: fh.min(canvas.height().saturating_sub(top)),
    };

    let stride = fw as usize * 4;
    for y in 0..rect.h {
        let row = &src.buffer[y as usize * stride..(y as usize + 1) * stride];
        for x in 0..rect.w {
            let px = &row[x as usize * 4..x as usize * 4 + 4];
            if px[3] == 0 {
                continue; // transparent index: canvas shows through
            }
            canvas.put_pixel(rect.x + x, rect.y + y, Rgba([px[0], px[1], px[2], px[3]]));
        }
    }
    rect
}

fn clear_rect(canvas: &mut RgbaImage, rect: Rect) {
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
}

/// Flatten alpha to 0/255; transparent pixels collapse to one color so they share a palette slot
fn binarize_alpha(image: &RgbaImage) -> Vec<u8> {
    let mut rgba = image.as_raw().clone();
    for px in rgba.chunks_exact_mut(4) {
        if px[3] < ALPHA_THRESHOLD {
            px.copy_from_slice(&[0, 0, 0, 0]);
        } else {
            px[3] = 0xFF;
        }
    }
    rgba
}

/// Palette-index one binarized RGBA frame
///
/// `from_rgba_speed` is exact up to 256 colors. Past that its NeuQuant path has no slot
/// for transparency and would mark the nearest opaque color transparent, so frames with
/// alpha-0 pixels are quantized here: opaque pixels to 255 colors, alpha-0 pixels to
/// [`TRANSPARENT_SLOT`].
fn quantize(width: u16, height: u16, rgba: &mut [u8], speed: i32) -> gif::Frame<'static> {
    let has_transparent = rgba.chunks_exact(4).any(|px| px[3] == 0);
    if !has_transparent || !exceeds_palette(rgba) {
        return gif::Frame::from_rgba_speed(width, height, rgba, speed);
    }

    let opaque: Vec<u8> = rgba.chunks_exact(4).filter(|px| px[3] != 0).flatten().copied().collect();
    let nq = NeuQuant::new(speed, usize::from(TRANSPARENT_SLOT), &opaque);

    let mut palette = nq.color_map_rgb();
    palette.resize(usize::from(TRANSPARENT_SLOT) * 3, 0);
    palette.extend_from_slice(&[0, 0, 0]);

    let buffer: Vec<u8> = rgba
        .chunks_exact(4)
        .map(|px| if px[3] == 0 { TRANSPARENT_SLOT } else { nq.index_of(px) as u8 })
        .collect();

    gif::Frame {
        width,
        height,
        buffer: Cow::Owned(buffer),
        palette: Some(palette),
        transparent: Some(TRANSPARENT_SLOT),
        ..gif::Frame::default()
    }
}

/// True if the frame has more than 256 distinct RGBA values
fn exceeds_palette(rgba: &[u8]) -> bool {
    let mut colors = HashSet::new();
    rgba.chunks_exact(4).any(|px| colors.insert([px[0], px[1], px[2], px[3]]) && colors.len() > 256)
}

/// Milliseconds -> GIF centiseconds (at least 1 so the delay survives)
fn delay_centis(duration_ms: u32) -> u16 {
    (duration_ms.saturating_add(5) / 10).clamp(1, u32::from(u16::MAX)) as u16
}

/// Swap palette entries so the frame's transparent color sits at `index`
fn pin_transparent_index(frame: &mut gif::Frame<'_>, index: u8) {
    let Some(current) = frame.transparent else {
        return;
    };
    if current == index {
        return;
    }
    let Some(palette) = frame.palette.as_mut() else {
        return;
    };

    let needed = (usize::from(index) + 1) * 3;
    if palette.len() < needed {
        palette.resize(needed, 0);
    }
    let (a, b) = (usize::from(current) * 3, usize::from(index) * 3);
    for c in 0..3 {
        palette.swap(a + c, b + c);
    }

    for px in frame.buffer.to_mut().iter_mut() {
        if *px == current {
            *px = index;
        } else if *px == index {
            *px = current;
        }
    }
    frame.transparent = Some(index);
}

fn to_gif_repeat(loop_count: u16) -> gif::Repeat {
    match loop_count {
        0 => gif::Repeat::Infinite,
        n => gif::Repeat::Finite(n),
    }
}

fn from_gif_disposal(method: gif::DisposalMethod) -> DisposalMode {
    match method {
        gif::DisposalMethod::Any => DisposalMode::default(),
        gif::DisposalMethod::Keep => DisposalMode::Keep,
        gif::DisposalMethod::Background => DisposalMode::Background,
        gif::DisposalMethod::Previous => DisposalMode::Previous,
    }
}

fn to_gif_disposal(mode: DisposalMode) -> gif::DisposalMethod {
    match mode {
        DisposalMode::Unspecified => gif::DisposalMethod::Any,
        DisposalMode::Keep => gif::DisposalMethod::Keep,
        DisposalMode::Background => gif::DisposalMethod::Background,
        DisposalMode::Previous => gif::DisposalMethod::Previous,
    }
}
