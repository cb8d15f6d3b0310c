use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clipjoin::{
    app, fetcher::Fetcher, ffmpeg::FfmpegCli, scratch::ScratchDir, AppState, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let scratch = ScratchDir::init(&config.scratch_dir).with_context(|| {
        format!(
            "failed to prepare scratch directory {}",
            config.scratch_dir.display()
        )
    })?;

    let ffmpeg = FfmpegCli::new(config.ffmpeg_path.clone());
    match ffmpeg.version().await {
        Ok(version) => tracing::info!(%version, "Found ffmpeg"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg is not usable, processing requests will fail"),
    }

    let fetcher = Fetcher::new().context("failed to build HTTP client")?;
    let state = AppState::new(scratch, fetcher, Arc::new(ffmpeg), config.request_timeout);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        scratch_dir = %state.scratch.root().display(),
        ffmpeg_path = %config.ffmpeg_path,
        request_timeout_secs = config.request_timeout.as_secs(),
        "Listening on {}",
        addr
    );
    axum::Server::bind(&addr)
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
    tracing::info!("Shutting down gracefully...");
}
