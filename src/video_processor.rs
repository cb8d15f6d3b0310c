use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::ffmpeg::ConcatManifest;
use crate::models::{MergeSources, MuxSources, Workflow};
use crate::scratch::ScratchSet;
use crate::state::AppState;

/// Download two videos and concatenate them with stream copy.
pub async fn merge_videos(
    state: &AppState,
    sources: MergeSources,
) -> Result<ProcessedVideo, AppError> {
    let mut scratch = state.scratch.new_set();
    let id = scratch.id();
    let first = scratch.path("video1", "mp4");
    let second = scratch.path("video2", "mp4");
    let manifest_path = scratch.path("concat", "txt");
    let output = scratch.path("merged", "mp4");

    tracing::info!(
        request_id = %id,
        video_url1 = %sources.first,
        video_url2 = %sources.second,
        "Merging videos"
    );

    let work = async {
        tokio::try_join!(
            state.fetcher.fetch(&sources.first, &first),
            state.fetcher.fetch(&sources.second, &second),
        )?;
        tracing::info!(request_id = %id, "Inputs downloaded");

        let mut manifest = ConcatManifest::new();
        manifest.push(&first)?.push(&second)?;
        manifest.write_to(&manifest_path).await?;

        state
            .tool
            .concat(&manifest_path, &output)
            .await
            .map_err(|source| AppError::Tool {
                workflow: Workflow::Merge,
                source,
            })
    };
    run_with_deadline(id, state.request_timeout, work).await?;

    ProcessedVideo::open(output, Workflow::Merge, scratch).await
}

/// Download a video and an audio track and mux them, cut to the shorter stream.
pub async fn add_audio(state: &AppState, sources: MuxSources) -> Result<ProcessedVideo, AppError> {
    let mut scratch = state.scratch.new_set();
    let id = scratch.id();
    let video = scratch.path("video", "mp4");
    let audio = scratch.path("audio", "mp3");
    let output = scratch.path("output", "mp4");

    tracing::info!(
        request_id = %id,
        video_url = %sources.video,
        audio_url = %sources.audio,
        "Adding audio to video"
    );

    let work = async {
        tokio::try_join!(
            state.fetcher.fetch(&sources.video, &video),
            state.fetcher.fetch(&sources.audio, &audio),
        )?;
        tracing::info!(request_id = %id, "Inputs downloaded");

        state
            .tool
            .mux(&video, &audio, &output)
            .await
            .map_err(|source| AppError::Tool {
                workflow: Workflow::AddAudio,
                source,
            })
    };
    run_with_deadline(id, state.request_timeout, work).await?;

    ProcessedVideo::open(output, Workflow::AddAudio, scratch).await
}

// Dropping `work` on expiry cancels in-flight downloads and kills ffmpeg.
async fn run_with_deadline<F>(id: Uuid, deadline: Duration, work: F) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>>,
{
    let result = match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(deadline)),
    };
    if let Err(e) = &result {
        tracing::warn!(request_id = %id, error = %e, "Workflow failed, discarding scratch files");
    }
    result
}

/// A finished output file together with the scratch files that produced it.
#[derive(Debug)]
pub struct ProcessedVideo {
    file: File,
    len: u64,
    workflow: Workflow,
    scratch: ScratchSet,
}

impl ProcessedVideo {
    async fn open(path: PathBuf, workflow: Workflow, scratch: ScratchSet) -> Result<Self, AppError> {
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        tracing::info!(
            request_id = %scratch.id(),
            workflow = %workflow,
            bytes = len,
            "Output ready"
        );
        Ok(Self {
            file,
            len,
            workflow,
            scratch,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.len
    }

    pub fn download_name(&self) -> &'static str {
        self.workflow.download_name()
    }

    pub fn into_stream(self) -> OutputStream {
        OutputStream {
            inner: ReaderStream::new(self.file),
            scratch: Some(self.scratch),
        }
    }
}

/// Response body over the output file.
///
/// Holds the request's scratch set and releases it right after the last
/// chunk is read, or when the body is dropped early.
pub struct OutputStream {
    inner: ReaderStream<File>,
    scratch: Option<ScratchSet>,
}

impl Stream for OutputStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        if item.is_none() {
            if let Some(scratch) = this.scratch.take() {
                tracing::debug!(request_id = %scratch.id(), "Output sent, removing scratch files");
            }
        }
        Poll::Ready(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::{wait_until_removed, ScratchDir};
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_output_stream_removes_scratch_at_end() {
        let dir = tempdir().unwrap();
        let scratch_dir = ScratchDir::init(dir.path()).unwrap();
        let mut scratch = scratch_dir.new_set();
        let input = scratch.path("video", "mp4");
        let output = scratch.path("output", "mp4");
        std::fs::write(&input, b"input").unwrap();
        std::fs::write(&output, b"merged bytes").unwrap();

        let video = ProcessedVideo::open(output.clone(), Workflow::AddAudio, scratch)
            .await
            .unwrap();
        assert_eq!(video.content_length(), 12);
        assert_eq!(video.download_name(), "video-with-audio.mp4");

        let mut stream = video.into_stream();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"merged bytes");
        // Released on the final poll, while the stream itself is still alive.
        assert!(wait_until_removed(&[&input, &output]).await);
        drop(stream);
    }

    #[tokio::test]
    async fn test_dropped_stream_removes_scratch() {
        let dir = tempdir().unwrap();
        let scratch_dir = ScratchDir::init(dir.path()).unwrap();
        let mut scratch = scratch_dir.new_set();
        let output = scratch.path("merged", "mp4");
        std::fs::write(&output, vec![0u8; 256 * 1024]).unwrap();

        let video = ProcessedVideo::open(output.clone(), Workflow::Merge, scratch)
            .await
            .unwrap();
        let mut stream = video.into_stream();
        stream.next().await.unwrap().unwrap();
        drop(stream);
        assert!(wait_until_removed(&[&output]).await);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout_error() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        };
        let err = run_with_deadline(Uuid::new_v4(), Duration::from_millis(20), work)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}
