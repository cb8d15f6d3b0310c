//! Service configuration, read from the environment at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SCRATCH_DIR: &str = "temp";
const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Shared working directory for downloaded inputs, manifests and outputs.
    pub scratch_dir: PathBuf,
    pub ffmpeg_path: String,
    /// Deadline covering both downloads and the ffmpeg run of one request.
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        let scratch_dir = lookup("SCRATCH_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));

        let ffmpeg_path = lookup("FFMPEG_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FFMPEG_PATH.to_string());
        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if ffmpeg_path.chars().any(|c| dangerous_chars.contains(&c)) {
            return Err(anyhow!("FFMPEG_PATH contains dangerous characters"));
        }

        let timeout_secs = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("REQUEST_TIMEOUT_SECS must be a number of seconds, got {raw:?}")
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(anyhow!("REQUEST_TIMEOUT_SECS must be greater than zero"));
        }

        Ok(Self {
            port,
            scratch_dir,
            ffmpeg_path,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
