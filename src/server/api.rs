//! REST API implementation using rouille.
//!
//! # Purpose
//!
//! Maps HTTP requests onto [`Pipeline`] calls and pipeline results onto JSON
//! responses. Every handler returns `Result<T, PipelineError>`; the single
//! conversion point [`error_response`] turns failures into `{"detail": ...}` with
//! the status from [`PipelineError::status_code`].
//!
//! # Key types
//!
//! - [`ApiServer`] - HTTP server runner, owns the shared pipeline
//! - [`UploadResponse`] / [`UploadResult`] - `POST /upload` body
//! - [`StatusResponse`] - `POST /flip` and `POST /swap_rgb` body
//!
//! # Thread safety
//!
//! rouille runs handlers on a thread pool. `ApiServer` is shared via `Arc`; the
//! pipeline itself serializes same-artifact mutations through the store locks.
//!
//! # Used by
//!
//! - `server/mod.rs` - re-exports public types
//! - `main.rs` - builds `ApiServer` and calls `run()`

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, error, info, warn};
use rouille::input::post::BufferedFile;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::{Pipeline, ProcessedArtifact};
use crate::store::{ArtifactId, PROCESSED_URL_PREFIX};

/// One artifact produced by an upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResult {
    pub url: String,
    /// Seconds, rounded to 2 decimals
    pub duration: f64,
    pub default_filename: String,
}

/// `POST /upload` success body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
}

/// `POST /flip` and `POST /swap_rgb` success body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    pub filename: String,
}

impl StatusResponse {
    fn success(id: ArtifactId) -> Self {
        Self { status: "success".to_string(), filename: id.file_name() }
    }
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    detail: String,
}

/// Health check body
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// REST API server
pub struct ApiServer {
    addr: String,
    pipeline: Arc<Pipeline>,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    pub fn new(addr: impl Into<String>, pipeline: Arc<Pipeline>, static_dir: Option<PathBuf>) -> Self {
        Self { addr: addr.into(), pipeline, static_dir }
    }

    /// Bind and serve until the process exits
    pub fn run(self) -> anyhow::Result<()> {
        let addr = self.addr.clone();
        let server = Arc::new(self);

        let http = rouille::Server::new(&addr, move |request| server.handle_request(request))
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;

        info!("API server listening on http://{}", http.server_addr());
        http.run();
        Ok(())
    }

    pub fn handle_request(&self, request: &Request) -> Response {
        // Handle preflight
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        debug!("{} {}", request.method(), request.raw_url());

        // Prefix-mounted directories
        if request.method() == "GET" {
            if let Some(sub) = request.remove_prefix(PROCESSED_URL_PREFIX) {
                return self.serve_artifact(&sub).with_additional_header("Access-Control-Allow-Origin", "*");
            }
            if let (Some(dir), Some(sub)) = (&self.static_dir, request.remove_prefix("/static")) {
                let response = rouille::match_assets(&sub, dir);
                if response.is_success() {
                    return response;
                }
                return not_found();
            }
        }

        let response = rouille::router!(request,
            (POST) ["/upload"] => {
                json_or_error(self.handle_upload(request))
            },
            (POST) ["/flip"] => {
                json_or_error(self.handle_flip(request))
            },
            (POST) ["/swap_rgb"] => {
                json_or_error(self.handle_swap(request))
            },

            (GET) ["/"] => {
                self.serve_index()
            },

            // Health check
            (GET) ["/api/health"] => {
                Response::json(&HealthResponse {
                    status: "ok",
                    service: "gifsplit",
                    version: env!("CARGO_PKG_VERSION"),
                })
            },

            // Fallback
            _ => {
                not_found()
            }
        );

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn handle_upload(&self, request: &Request) -> Result<UploadResponse> {
        let input = rouille::post_input!(request, { file: BufferedFile })
            .map_err(|e| PipelineError::InvalidRequest(format!("expected multipart field 'file': {}", e)))?;
        let filename = input.file.filename.unwrap_or_default();
        self.upload(&filename, &input.file.data)
    }

    /// Run the upload pipeline on already extracted multipart data
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadResponse> {
        let artifacts = self.pipeline.process_upload(filename, bytes)?;
        Ok(UploadResponse {
            results: artifacts.iter().map(|a| self.upload_result(a)).collect(),
        })
    }

    fn upload_result(&self, artifact: &ProcessedArtifact) -> UploadResult {
        UploadResult {
            url: self.pipeline.store().url_for(artifact.id),
            duration: artifact.duration,
            default_filename: artifact.default_filename.clone(),
        }
    }

    fn handle_flip(&self, request: &Request) -> Result<StatusResponse> {
        let filename = required_param(request, "filename")?;
        let id = self.pipeline.flip(&filename)?;
        Ok(StatusResponse::success(id))
    }

    fn handle_swap(&self, request: &Request) -> Result<StatusResponse> {
        let filename = required_param(request, "filename")?;
        // Unknown artifact wins over a bad or missing map
        self.pipeline.store().resolve(&filename)?;
        let rgb_map = required_param(request, "rgb_map")?;
        let id = self.pipeline.swap_channels(&filename, &rgb_map)?;
        Ok(StatusResponse::success(id))
    }

    fn serve_artifact(&self, request: &Request) -> Response {
        // Only `<uuid>.gif` is addressable; snapshots and staged uploads stay private
        let name = request.url();
        let name = name.trim_start_matches('/');
        if ArtifactId::from_file_name(name).is_none() {
            return not_found();
        }
        let response = rouille::match_assets(request, self.pipeline.store().root());
        if response.is_success() { response } else { not_found() }
    }

    fn serve_index(&self) -> Response {
        let Some(dir) = &self.static_dir else {
            return not_found();
        };
        match File::open(dir.join("index.html")) {
            Ok(file) => Response::from_file("text/html; charset=utf-8", file),
            Err(e) => {
                warn!("index.html unavailable in {}: {}", dir.display(), e);
                not_found()
            }
        }
    }
}

fn required_param(request: &Request, name: &str) -> Result<String> {
    request
        .get_param(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::InvalidRequest(format!("missing query parameter '{}'", name)))
}

fn json_or_error<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => Response::json(&body),
        Err(e) => error_response(&e),
    }
}

/// `{"detail": ...}` with the variant's status code
pub fn error_response(err: &PipelineError) -> Response {
    let status = err.status_code();
    if status >= 500 {
        error!("Request failed ({}): {}", status, err);
    } else {
        warn!("Request rejected ({}): {}", status, err);
    }
    Response::json(&ErrorResponse { detail: err.to_string() }).with_status_code(status)
}

fn not_found() -> Response {
    Response::json(&ErrorResponse { detail: "Not found".to_string() }).with_status_code(404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::frame::fixtures::*;
    use crate::pipeline::PipelineConfig;
    use crate::store::ArtifactStore;
    use std::io::Read;
    use tempfile::TempDir;

    fn server() -> (TempDir, ApiServer) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("processed")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>gifsplit</html>").unwrap();
        let pipeline = Arc::new(Pipeline::new(store, PipelineConfig::default()));
        let server = ApiServer::new("127.0.0.1:0", pipeline, Some(dir.path().to_path_buf()));
        (dir, server)
    }

    fn body(response: Response) -> (u16, Vec<u8>) {
        let status = response.status_code;
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        (status, bytes)
    }

    fn call(server: &ApiServer, method: &str, url: &str) -> (u16, serde_json::Value) {
        let request = Request::fake_http(method, url, vec![], vec![]);
        let (status, bytes) = body(server.handle_request(&request));
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn sbs_gif() -> Vec<u8> {
        let frames = (0..4).map(|_| halves(48, 24, RED, BLUE, 100)).collect();
        codec::encode(&animation(frames)).unwrap()
    }

    fn upload_one(server: &ApiServer) -> String {
        let frames = vec![gradient(16, 16, 1, 80), gradient(16, 16, 2, 80)];
        let bytes = codec::encode(&animation(frames)).unwrap();
        let response = server.upload("clip.gif", &bytes).unwrap();
        assert_eq!(response.results.len(), 1);
        response.results[0].url.trim_start_matches("/processed/").to_string()
    }

    /// Test: Multipart upload end to end
    /// Validates: results JSON shape, split naming, artifacts retrievable
    #[test]
    fn test_upload_multipart() {
        let (_dir, server) = server();
        let gif = sbs_gif();

        let boundary = "gifsplitboundary";
        let mut data = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"dance.gif\"\r\nContent-Type: image/gif\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        data.extend_from_slice(&gif);
        data.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::fake_http(
            "POST",
            "/upload",
            vec![(
                "Content-Type".to_string(),
                format!("multipart/form-data; boundary={}", boundary),
            )],
            data,
        );
        let (status, bytes) = body(server.handle_request(&request));
        assert_eq!(status, 200);
        let parsed: UploadResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].duration, 0.4);
        assert_eq!(parsed.results[0].default_filename, "dance_0_4s_left.gif");
        assert_eq!(parsed.results[1].default_filename, "dance_0_4s_right.gif");

        for result in &parsed.results {
            let request = Request::fake_http("GET", &result.url, vec![], vec![]);
            let (status, gif) = body(server.handle_request(&request));
            assert_eq!(status, 200);
            let decoded = codec::decode(&gif).unwrap();
            assert_eq!(decoded.resolution(), (240, 240));
            assert_eq!(decoded.frame_count(), 4);
        }
    }

    /// Test: Upload without multipart body is a client error
    #[test]
    fn test_upload_missing_file() {
        let (_dir, server) = server();
        let (status, json) = call(&server, "POST", "/upload");
        assert_eq!(status, 400);
        assert!(json["detail"].as_str().unwrap().contains("file"));
    }

    /// Test: Upload error statuses
    /// Validates: Wrong suffix and undecodable bytes are 400
    #[test]
    fn test_upload_errors() {
        let (_dir, server) = server();
        let err = server.upload("photo.png", &sbs_gif()).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = server.upload("fake.gif", b"definitely not a gif").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = server.upload("", &sbs_gif()).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    /// Test: Flip endpoint success and not-found paths
    #[test]
    fn test_flip_endpoint() {
        let (_dir, server) = server();
        let name = upload_one(&server);

        let (status, json) = call(&server, "POST", &format!("/flip?filename={}", name));
        assert_eq!(status, 200);
        assert_eq!(json["status"], "success");
        assert_eq!(json["filename"], name.as_str());

        let ghost = ArtifactId::generate().file_name();
        let (status, json) = call(&server, "POST", &format!("/flip?filename={}", ghost));
        assert_eq!(status, 404);
        assert!(json["detail"].is_string());

        let (status, _) = call(&server, "POST", "/flip?filename=..%2Fetc%2Fpasswd");
        assert_eq!(status, 404);

        let (status, _) = call(&server, "POST", "/flip");
        assert_eq!(status, 400);
    }

    /// Test: Swap endpoint statuses
    /// Validates: 404 before 400, bad map 400, good map 200
    #[test]
    fn test_swap_endpoint() {
        let (_dir, server) = server();
        let name = upload_one(&server);
        let ghost = ArtifactId::generate().file_name();

        let (status, _) = call(&server, "POST", &format!("/swap_rgb?filename={}&rgb_map=rrb", ghost));
        assert_eq!(status, 404);
        let (status, _) = call(&server, "POST", &format!("/swap_rgb?filename={}", ghost));
        assert_eq!(status, 404);

        let (status, json) = call(&server, "POST", &format!("/swap_rgb?filename={}&rgb_map=rrb", name));
        assert_eq!(status, 400);
        assert!(json["detail"].as_str().unwrap().contains("rrb"));
        let (status, _) = call(&server, "POST", &format!("/swap_rgb?filename={}", name));
        assert_eq!(status, 400);

        let (status, json) = call(&server, "POST", &format!("/swap_rgb?filename={}&rgb_map=gbr", name));
        assert_eq!(status, 200);
        assert_eq!(json["filename"], name.as_str());
    }

    /// Test: Static retrieval only exposes current versions
    #[test]
    fn test_processed_retrieval() {
        let (_dir, server) = server();
        let name = upload_one(&server);
        let id = ArtifactId::from_file_name(&name).unwrap();
        let (status, _) = call(&server, "POST", &format!("/swap_rgb?filename={}&rgb_map=bgr", name));
        assert_eq!(status, 200);

        let request = Request::fake_http("GET", &format!("/processed/{}", name), vec![], vec![]);
        let (status, bytes) = body(server.handle_request(&request));
        assert_eq!(status, 200);
        assert!(bytes.starts_with(b"GIF89a"));

        let snapshot = format!("/processed/{}", id.original_file_name());
        let (status, _) = call(&server, "GET", &snapshot);
        assert_eq!(status, 404);

        let ghost = format!("/processed/{}", ArtifactId::generate().file_name());
        let (status, _) = call(&server, "GET", &ghost);
        assert_eq!(status, 404);
    }

    /// Test: Index, health and fallback routes
    #[test]
    fn test_misc_routes() {
        let (_dir, server) = server();

        let (status, json) = call(&server, "GET", "/api/health");
        assert_eq!(status, 200);
        assert_eq!(json["status"], "ok");

        let request = Request::fake_http("GET", "/", vec![], vec![]);
        let (status, bytes) = body(server.handle_request(&request));
        assert_eq!(status, 200);
        assert_eq!(bytes, b"<html>gifsplit</html>");

        let (status, json) = call(&server, "GET", "/nope");
        assert_eq!(status, 404);
        assert_eq!(json["detail"], "Not found");
    }

    /// Test: Error body shape
    #[test]
    fn test_error_response_shape() {
        let response = error_response(&PipelineError::InvalidMapping("xyz".into()));
        let (status, bytes) = body(response);
        assert_eq!(status, 400);
        let parsed: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.detail.contains("xyz"));
    }
}
