//! Upload pipeline and post-hoc artifact transforms.
//!
//! # Purpose
//!
//! Orchestrates codec + transform + store for the three request kinds:
//!
//! ```text
//! upload:  bytes ─stage─▶ decode ─split?─▶ resize(canvas) ─encode─▶ store.create  (x1 or x2)
//! flip:    current ─decode─▶ flip_horizontal ─encode─▶ current
//! swap:    original (lazy snapshot of current) ─decode─▶ permute ─encode─▶ current
//! ```
//!
//! # Timing
//!
//! Per-frame durations flow through every stage untouched (no averaging), together
//! with loop count, disposal and transparency index read at decode time.
//!
//! # Used by
//!
//! - `server/api.rs` - one call per HTTP request
//! - `main.rs` - constructs the pipeline with the configured canvas and store

use std::io::BufReader;
use std::path::Path;

use log::{debug, info};

use crate::codec;
use crate::error::{PipelineError, Result};
use crate::frame::{AnimatedImage, AnimationMeta, DisposalMode};
use crate::store::{ArtifactId, ArtifactStore};
use crate::transform::{self, ChannelMap, Side};

/// Default output canvas
pub const DEFAULT_CANVAS: (u32, u32) = (240, 240);

/// Pipeline tuning, fixed at start-up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Every output frame is resized to exactly this size
    pub canvas: (u32, u32),
    /// NeuQuant speed for frames with more than 256 colors
    pub encode_speed: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas: DEFAULT_CANVAS,
            encode_speed: codec::DEFAULT_ENCODE_SPEED,
        }
    }
}

/// One stored result of an upload
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedArtifact {
    pub id: ArtifactId,
    /// Set when the upload was split
    pub side: Option<Side>,
    /// Total duration of the source animation in seconds (2 decimals)
    pub duration: f64,
    pub default_filename: String,
}

pub struct Pipeline {
    store: ArtifactStore,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: ArtifactStore, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate, stage, decode and process an uploaded file
    ///
    /// The staged temp file is removed before returning, on success and on error.
    pub fn process_upload(&self, upload_name: &str, bytes: &[u8]) -> Result<Vec<ProcessedArtifact>> {
        if !has_gif_suffix(upload_name) {
            return Err(PipelineError::UnsupportedFilename(upload_name.to_string()));
        }

        let staged = self.store.stage_upload(bytes)?;
        let result = codec::decode_from(BufReader::new(staged.reopen()?))
            .and_then(|animation| self.process(&filename_prefix(upload_name), &animation));
        drop(staged);
        result
    }

    /// Split/resize/encode/persist an already decoded animation
    pub fn process(&self, prefix: &str, animation: &AnimatedImage) -> Result<Vec<ProcessedArtifact>> {
        let duration = animation.total_duration_secs();
        info!(
            "Processing '{}': {}x{}, {} frames, {}s",
            prefix,
            animation.width(),
            animation.height(),
            animation.frame_count(),
            duration
        );

        prepare_outputs(animation, self.config.canvas)?
            .into_iter()
            .map(|(side, output)| -> Result<ProcessedArtifact> {
                let bytes = codec::encode_with_speed(&output, self.config.encode_speed)?;
                let id = self.store.create(&bytes)?;
                let default_filename = default_filename(prefix, duration, side);
                info!("Created artifact {} ({})", id, default_filename);
                Ok(ProcessedArtifact { id, side, duration, default_filename })
            })
            .collect()
    }

    /// Mirror every frame of the current version in place
    pub fn flip(&self, filename: &str) -> Result<ArtifactId> {
        let id = self.store.resolve(filename)?;
        self.store.with_lock(id, || {
            let current = decode_stored(&self.store.read_current(id)?)?;
            let flipped = current.map_frames(transform::flip_horizontal)?;
            self.store.write_current(id, &self.encode(&flipped)?)?;
            info!("Flipped {} ({} frames)", id, flipped.frame_count());
            Ok(id)
        })
    }

    /// Recompute the current version from the original with channels permuted
    ///
    /// "rgb" restores the original. Swaps never compound: the input is always the
    /// snapshot taken before the first swap.
    pub fn swap_channels(&self, filename: &str, rgb_map: &str) -> Result<ArtifactId> {
        let id = self.store.resolve(filename)?;
        let map = ChannelMap::parse(rgb_map)?;

        self.store.with_lock(id, || {
            if self.store.ensure_original(id)? {
                debug!("Snapshot original for {}", id);
            }

            if map.is_identity() {
                self.store.restore_original(id)?;
                info!("Restored {} from original", id);
                return Ok(id);
            }

            let original = decode_stored(&self.store.read_original(id)?)?;
            let swapped = original.map_frames(|f| transform::permute_channels(f, map))?;
            self.store.write_current(id, &self.encode(&swapped)?)?;
            info!("Swapped channels of {} to '{}'", id, map);
            Ok(id)
        })
    }

    fn encode(&self, animation: &AnimatedImage) -> Result<Vec<u8>> {
        codec::encode_with_speed(animation, self.config.encode_speed)
    }
}

/// Split decision + resize, one output per side (or one unsplit output)
///
/// Pure: no I/O, so it is usable without a store.
pub fn prepare_outputs(
    animation: &AnimatedImage,
    canvas: (u32, u32),
) -> Result<Vec<(Option<Side>, AnimatedImage)>> {
    let (width, height) = animation.resolution();
    let sides: Vec<Option<Side>> = if transform::is_side_by_side(width, height) {
        Side::all().iter().copied().map(Some).collect()
    } else {
        vec![None]
    };
    debug!("Split decision for {}x{}: {:?}", width, height, sides);

    let (cw, ch) = canvas;
    sides
        .into_iter()
        .map(|side| -> Result<(Option<Side>, AnimatedImage)> {
            let output = animation.map_frames(|frame| match side {
                Some(side) => transform::resize(&transform::split(frame, side), cw, ch),
                None => transform::resize(frame, cw, ch),
            })?;
            let meta = output_meta(output.meta(), output.has_transparency());
            Ok((side, output.with_meta(meta)))
        })
        .collect()
}

/// Metadata for re-encoded full-canvas frames
///
/// Composited frames with transparent pixels must be cleared between draws, so a
/// Keep/Unspecified source disposal becomes Background in that case.
pub fn output_meta(source: AnimationMeta, has_transparency: bool) -> AnimationMeta {
    if has_transparency && !source.disposal.clears_canvas() {
        AnimationMeta { disposal: DisposalMode::Background, ..source }
    } else {
        source
    }
}

/// Case-insensitive `.gif` suffix check
pub fn has_gif_suffix(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".gif")
}

/// Upload name without directories and extension
pub fn filename_prefix(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

/// Seconds as used in filenames: `1` for 1.0, `1_5` for 1.5
pub fn format_duration(duration_s: f64) -> String {
    if duration_s.fract() == 0.0 {
        format!("{}", duration_s as i64)
    } else {
        duration_s.to_string().replace('.', "_")
    }
}

/// `{prefix}_{dur}s.gif` or `{prefix}_{dur}s_{side}.gif`
pub fn default_filename(prefix: &str, duration_s: f64, side: Option<Side>) -> String {
    let dur = format_duration(duration_s);
    match side {
        Some(side) => format!("{}_{}s_{}.gif", prefix, dur, side),
        None => format!("{}_{}s.gif", prefix, dur),
    }
}

/// Stored files were written by us; failing to read one is a server error, not bad input
fn decode_stored(bytes: &[u8]) -> Result<AnimatedImage> {
    codec::decode(bytes).map_err(|e| match e {
        PipelineError::Decode(msg) => PipelineError::Transform(format!("stored artifact unreadable: {}", msg)),
        other => other,
    })
}
