mod api;
mod api_error;
mod config;
mod db;
mod events;
mod jobs;
mod openapi;
mod storage;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::events::Broadcaster;
use crate::jobs::queue::{JobKind, JobQueue};
use crate::jobs::worker::{WorkerContext, WorkerOptions, run_worker};

#[derive(Parser, Debug)]
#[command(name = "plateworks-server", about = "Plateworks image service")]
struct Args {
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| env::var(config::CONFIG_PATH_ENV).ok().map(PathBuf::from));
    let settings = Arc::new(config::Settings::load(config_path)?);

    tokio::fs::create_dir_all(settings.images_dir())
        .await
        .context("failed to create image storage directory")?;
    let pool = db::open_pool(&settings.database_file()).await?;
    db::run_migrations(&pool).await?;

    let plates = db::plates::PlateStore::new(pool);
    let images = storage::ImageStore::new(settings.images_dir());
    let broadcaster = Broadcaster::new(settings.processing.event_capacity);
    let metadata_queue = Arc::new(JobQueue::new());
    let thumbnail_queue = Arc::new(JobQueue::new());

    let options = WorkerOptions::from_settings(&settings);
    let cancel = CancellationToken::new();
    let metadata_worker = tokio::spawn(run_worker(
        WorkerContext {
            kind: JobKind::MetadataExtraction,
            queue: metadata_queue.clone(),
            plates: plates.clone(),
            images: images.clone(),
            broadcaster: broadcaster.clone(),
            options,
        },
        cancel.clone(),
    ));
    let thumbnail_worker = tokio::spawn(run_worker(
        WorkerContext {
            kind: JobKind::ThumbnailGeneration,
            queue: thumbnail_queue.clone(),
            plates: plates.clone(),
            images: images.clone(),
            broadcaster: broadcaster.clone(),
            options,
        },
        cancel.clone(),
    ));

    let state = api::AppState {
        plates,
        images,
        broadcaster,
        metadata_queue,
        thumbnail_queue,
        settings: Arc::clone(&settings),
    };
    let app = api::router(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let listen_addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    let _ = metadata_worker.await;
    let _ = thumbnail_worker.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install terminate handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
