//! Shared fixtures: a counting remote media server, fake media tools and a
//! running instance of the service.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use clipjoin::{
    app,
    fetcher::Fetcher,
    ffmpeg::{MediaTool, ToolError},
    scratch::ScratchDir,
    AppState,
};
use tempfile::TempDir;

pub const CLIP_A: &[u8] = b"clip-a: ten seconds of video";
pub const CLIP_B: &[u8] = b"clip-b: five seconds";
pub const AUDIO: &[u8] = b"audio: twelve seconds of music";

async fn serve(router: Router) -> SocketAddr {
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = axum::Server::bind(&addr).serve(router.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Remote media host that counts every request it receives.
#[derive(Clone)]
pub struct RemoteMedia {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl RemoteMedia {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/media/:name", get(serve_media))
            .with_state(hits.clone());
        let addr = serve(router).await;
        Self { addr, hits }
    }

    pub fn url(&self, name: &str) -> String {
        format!("http://{}/media/{}", self.addr, name)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve_media(
    State(hits): State<Arc<AtomicUsize>>,
    UrlPath(name): UrlPath<String>,
) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    match name.as_str() {
        "clip-a.mp4" => (StatusCode::OK, CLIP_A.to_vec()),
        "clip-b.mp4" => (StatusCode::OK, CLIP_B.to_vec()),
        "music.mp3" => (StatusCode::OK, AUDIO.to_vec()),
        "slow.mp4" => {
            tokio::time::sleep(Duration::from_secs(10)).await;
            (StatusCode::OK, CLIP_A.to_vec())
        }
        other if other.starts_with("numbered-") => (StatusCode::OK, other.as_bytes().to_vec()),
        _ => (StatusCode::NOT_FOUND, b"not found".to_vec()),
    }
}

/// Stands in for ffmpeg: concat appends the listed inputs, mux appends the
/// audio bytes to the video bytes.
#[derive(Default)]
pub struct FakeTool {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let listing = tokio::fs::read_to_string(manifest).await.map_err(failed)?;
        let mut merged = Vec::new();
        for line in listing.lines() {
            let path = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .ok_or_else(|| failed(format!("bad manifest line: {line}")))?;
            assert!(Path::new(path).is_absolute());
            merged.extend(tokio::fs::read(path).await.map_err(failed)?);
        }
        tokio::fs::write(output, merged).await.map_err(failed)
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut muxed = tokio::fs::read(video).await.map_err(failed)?;
        muxed.extend(tokio::fs::read(audio).await.map_err(failed)?);
        tokio::fs::write(output, muxed).await.map_err(failed)
    }
}

fn failed(e: impl ToString) -> ToolError {
    ToolError::Failed {
        status: "exit status: 1".to_string(),
        stderr: e.to_string(),
    }
}

/// Always fails after leaving a partial output behind.
pub struct FailingTool;

#[async_trait]
impl MediaTool for FailingTool {
    async fn concat(&self, _manifest: &Path, output: &Path) -> Result<(), ToolError> {
        tokio::fs::write(output, b"partial").await.map_err(failed)?;
        Err(failed("Non-monotonous DTS in output stream"))
    }

    async fn mux(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<(), ToolError> {
        tokio::fs::write(output, b"partial").await.map_err(failed)?;
        Err(failed("Stream map '1:a:0' matches no streams"))
    }
}

/// Never finishes on its own.
pub struct HangingTool;

#[async_trait]
impl MediaTool for HangingTool {
    async fn concat(&self, _manifest: &Path, _output: &Path) -> Result<(), ToolError> {
        std::future::pending().await
    }

    async fn mux(&self, _video: &Path, _audio: &Path, _output: &Path) -> Result<(), ToolError> {
        std::future::pending().await
    }
}

pub struct TestService {
    pub addr: SocketAddr,
    pub scratch: TempDir,
    pub client: reqwest::Client,
}

impl TestService {
    pub async fn start(tool: Arc<dyn MediaTool>) -> Self {
        Self::start_with_timeout(tool, Duration::from_secs(30)).await
    }

    pub async fn start_with_timeout(tool: Arc<dyn MediaTool>, timeout: Duration) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let state = AppState::new(
            ScratchDir::init(scratch.path()).unwrap(),
            Fetcher::new().unwrap(),
            tool,
            timeout,
        );
        let addr = serve(app(state)).await;
        Self {
            addr,
            scratch,
            client: reqwest::Client::new(),
        }
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("http://{}{}", self.addr, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    /// Scratch removal runs on the server side of the connection, so give it
    /// a moment before asserting.
    pub async fn wait_for_empty_scratch(&self) -> Vec<PathBuf> {
        for _ in 0..50 {
            let files = self.scratch_files();
            if files.is_empty() {
                return files;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.scratch_files()
    }
}
