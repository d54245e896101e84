//! gifsplit - animated GIF split/resize service library
//!
//! Re-exports all modules for use by the binary target.

// Core (decode, transform, encode)
pub mod codec;
pub mod error;
pub mod frame;
pub mod transform;

// Orchestration and persistence
pub mod pipeline;
pub mod store;

// App modules
pub mod cli;
pub mod config;
pub mod server;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use frame::{AnimatedImage, AnimationMeta, DisposalMode, Frame};
pub use pipeline::{Pipeline, PipelineConfig, ProcessedArtifact};
pub use store::{ArtifactId, ArtifactStore};
pub use transform::{ChannelMap, Side};
