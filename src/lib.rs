pub mod config;
pub mod error;
pub mod fetcher;
pub mod ffmpeg;
pub mod models;
pub mod routes;
pub mod scratch;
pub mod state;
pub mod video_processor;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Full application router with request tracing.
pub fn app(state: AppState) -> Router {
    routes::create_routes(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
