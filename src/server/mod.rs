//! HTTP surface of the GIF split service.
//!
//! # Purpose
//!
//! Accepts GIF uploads, hands them to the [`Pipeline`](crate::pipeline::Pipeline),
//! and serves the stored results. Flip and channel swap mutate an artifact in place
//! and are addressed by the artifact's file name.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐                            ┌──────────────────────┐
//! │   rouille worker pool   │  ── process_upload() ───▶  │   Pipeline           │
//! │                         │  ── flip() ─────────────▶  │   codec / transform  │
//! │  POST /upload           │  ── swap_channels() ────▶  │                      │
//! │  POST /flip             │                            └──────────┬───────────┘
//! │  POST /swap_rgb         │                                       │
//! │  GET  /processed/*      │ ◀──── match_assets ─────   ArtifactStore (flat dir)
//! └─────────────────────────┘
//! ```
//!
//! - **rouille** - sync HTTP server (no async runtime needed for CPU-bound work)
//! - **PipelineError** - one typed error, one status code per variant
//!
//! # Dependencies
//!
//! - `rouille` - HTTP server, multipart input, static files
//! - `serde` - JSON response bodies (rouille serializes them)
//!
//! # Used by
//!
//! - `main.rs` - starts server via `ApiServer::run()`
//!
//! # Endpoints
//!
//! | Method | Path                                   | Description                      |
//! |--------|----------------------------------------|----------------------------------|
//! | POST   | `/upload`                              | Multipart `file`, returns results |
//! | POST   | `/flip?filename=<id>.gif`              | Mirror horizontally in place     |
//! | POST   | `/swap_rgb?filename=<id>.gif&rgb_map=` | Permute channels of the original |
//! | GET    | `/processed/<id>.gif`                  | Download current version         |
//! | GET    | `/`                                    | `index.html` from static dir     |
//! | GET    | `/static/...`                          | Static assets                    |
//! | GET    | `/api/health`                          | Health check                     |

mod api;

pub use api::{ApiServer, StatusResponse, UploadResponse, UploadResult, error_response};
