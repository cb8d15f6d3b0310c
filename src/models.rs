use std::fmt;

use reqwest::Url;
use serde::Deserialize;

use crate::error::AppError;

/// Body of `POST /merge-videos`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct MergeVideosRequest {
    pub video_url1: Option<String>,
    pub video_url2: Option<String>,
}

/// Body of `POST /add-audio`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddAudioRequest {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MergeSources {
    pub first: Url,
    pub second: Url,
}

#[derive(Debug, Clone)]
pub struct MuxSources {
    pub video: Url,
    pub audio: Url,
}

impl MergeVideosRequest {
    pub fn validate(&self) -> Result<MergeSources, AppError> {
        const MISSING: &str = "videoUrl1 and videoUrl2 are required";
        let (first, second) = match (present(&self.video_url1), present(&self.video_url2)) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(AppError::MissingFields(MISSING)),
        };
        Ok(MergeSources {
            first: parse_url("videoUrl1", first)?,
            second: parse_url("videoUrl2", second)?,
        })
    }
}

impl AddAudioRequest {
    pub fn validate(&self) -> Result<MuxSources, AppError> {
        const MISSING: &str = "videoUrl and audioUrl are required";
        let (video, audio) = match (present(&self.video_url), present(&self.audio_url)) {
            (Some(video), Some(audio)) => (video, audio),
            _ => return Err(AppError::MissingFields(MISSING)),
        };
        Ok(MuxSources {
            video: parse_url("videoUrl", video)?,
            audio: parse_url("audioUrl", audio)?,
        })
    }
}

// Empty strings count as missing, same as an absent key or null.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Reject URLs that do not parse or are not http(s) with a 400 before any
/// download starts, instead of letting the download fail with a 500.
fn parse_url(field: &'static str, raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw).map_err(|e| AppError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::InvalidUrl {
            field,
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Merge,
    AddAudio,
}

impl Workflow {
    /// File name offered to the client in `Content-Disposition`.
    pub fn download_name(self) -> &'static str {
        match self {
            Workflow::Merge => "merged.mp4",
            Workflow::AddAudio => "video-with-audio.mp4",
        }
    }

    pub fn tool_failure_message(self) -> &'static str {
        match self {
            Workflow::Merge => "FFmpeg merge error",
            Workflow::AddAudio => "FFmpeg audio merge error",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Merge => f.write_str("merge-videos"),
            Workflow::AddAudio => f.write_str("add-audio"),
        }
    }
}
