//! The external media tool.
//!
//! The service depends on exactly two ffmpeg command contracts: the concat
//! demuxer with stream copy, and a two-input stream mapping cut to the
//! shorter stream. [`MediaTool`] is the seam; [`FfmpegCli`] drives the real
//! binary as a subprocess.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("concat input must be an absolute path: {}", .0.display())]
    RelativePath(PathBuf),

    #[error("concat input contains characters the manifest cannot express: {}", .0.display())]
    UnsupportedCharacters(PathBuf),
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Concatenate the inputs listed in `manifest` into `output` without re-encoding.
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<(), ToolError>;

    /// Take the first video stream of `video` and the first audio stream of
    /// `audio`, stopping at the end of the shorter one.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), ToolError>;
}

#[derive(Clone, Debug)]
pub struct FfmpegCli {
    ffmpeg_path: String,
}

impl FfmpegCli {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// First line of `ffmpeg -version`.
    pub async fn version(&self) -> Result<String, ToolError> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), ToolError> {
        tracing::debug!(program = %self.ffmpeg_path, args = ?args, "Running ffmpeg");

        // kill_on_drop: a request that hits its deadline drops this future,
        // which must take the child process down with it.
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegCli {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<(), ToolError> {
        self.run(concat_args(manifest, output)).await
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), ToolError> {
        self.run(mux_args(video, audio, output)).await
    }
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-f", "concat", "-safe", "0", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(manifest.into());
    args.extend(["-c", "copy"].iter().map(OsString::from));
    args.push(output.into());
    args
}

pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into(), "-i".into()];
    args.push(video.into());
    args.push("-i".into());
    args.push(audio.into());
    args.extend(
        ["-map", "0:v:0", "-map", "1:a:0", "-c", "copy", "-shortest"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Input list for ffmpeg's concat demuxer.
#[derive(Debug, Default)]
pub struct ConcatManifest {
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self, ManifestError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(ManifestError::RelativePath(path));
        }
        let text = path
            .to_str()
            .ok_or_else(|| ManifestError::UnsupportedCharacters(path.clone()))?;
        if text.contains(['\n', '\r', '\0']) {
            return Err(ManifestError::UnsupportedCharacters(path));
        }
        self.entries.push(path);
        Ok(self)
    }

    /// One `file '<path>'` line per entry. A single quote is written as
    /// `'\''`: close the quoted run, escaped quote, reopen.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            // push() only accepts UTF-8 paths
            let path = entry.to_string_lossy().replace('\'', r"'\''");
            out.push_str("file '");
            out.push_str(&path);
            out.push_str("'\n");
        }
        out
    }

    pub async fn write_to(&self, dest: &Path) -> io::Result<()> {
        tokio::fs::write(dest, self.render()).await
    }
}
