use axum::{
    body::StreamBody,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::{
    error::{AppError, ValidatedJson},
    models::{AddAudioRequest, MergeVideosRequest},
    state::AppState,
    video_processor::{add_audio, merge_videos, ProcessedVideo},
};

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/merge-videos", post(merge_videos_handler))
        .route("/add-audio", post(add_audio_handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn merge_videos_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<MergeVideosRequest>,
) -> Result<Response, AppError> {
    let sources = payload.validate()?;
    let video = merge_videos(&state, sources).await?;
    Ok(attachment(video))
}

async fn add_audio_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<AddAudioRequest>,
) -> Result<Response, AppError> {
    let sources = payload.validate()?;
    let video = add_audio(&state, sources).await?;
    Ok(attachment(video))
}

fn attachment(video: ProcessedVideo) -> Response {
    let content_disposition = format!("attachment; filename=\"{}\"", video.download_name());
    let content_length = video.content_length().to_string();
    (
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
            (header::CONTENT_LENGTH, content_length),
        ],
        StreamBody::new(video.into_stream()),
    )
        .into_response()
}
