use std::sync::Arc;
use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Settings;
use crate::db::plates::{PlateStore, PlateStoreError};
use crate::events::{Broadcaster, PlateEvent};
use crate::jobs::PlateProcessError;
use crate::jobs::metadata::{extract_capture_timestamp, format_timestamp, now_timestamp};
use crate::jobs::queue::{JobKind, JobQueue};
use crate::jobs::thumbnail::ensure_jpeg;
use crate::storage::{ImageStore, ImageStoreError, THUMBNAIL_SUFFIX, derived_name};

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerOptions {
    pub idle_backoff: Duration,
    pub jpeg_quality: u8,
}

impl WorkerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            idle_backoff: settings.idle_backoff(),
            jpeg_quality: settings.processing.jpeg_quality,
        }
    }
}

/// Everything one worker needs to drain its queue.
pub(crate) struct WorkerContext {
    pub kind: JobKind,
    pub queue: Arc<JobQueue>,
    pub plates: PlateStore,
    pub images: ImageStore,
    pub broadcaster: Broadcaster,
    pub options: WorkerOptions,
}

/// Drains the queue until cancelled, one item at a time.
///
/// An item failure is logged and dropped; the loop never exits on it.
/// An empty queue parks on the enqueue signal with a timed backoff as a
/// fallback, and cancellation is observed both there and between items.
pub(crate) async fn run_worker(ctx: WorkerContext, cancel: CancellationToken) {
    tracing::info!(kind = %ctx.kind, "worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match ctx.queue.try_dequeue() {
            Some(plate_id) => {
                if let Err(err) = process_plate(&ctx, plate_id).await {
                    tracing::error!(
                        plate_id = %plate_id,
                        kind = %ctx.kind,
                        error = ?err,
                        "failed to process plate"
                    );
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ctx.queue.notified() => {}
                    _ = tokio::time::sleep(ctx.options.idle_backoff) => {}
                }
            }
        }
    }
    tracing::info!(kind = %ctx.kind, "worker stopped");
}

async fn process_plate(ctx: &WorkerContext, plate_id: Uuid) -> Result<(), PlateProcessError> {
    match ctx.kind {
        JobKind::MetadataExtraction => process_metadata(ctx, plate_id).await,
        JobKind::ThumbnailGeneration => process_thumbnail(ctx, plate_id).await,
    }
}

async fn process_metadata(ctx: &WorkerContext, plate_id: Uuid) -> Result<(), PlateProcessError> {
    let bytes = read_original(ctx, plate_id).await?;
    let captured_at = extract_capture_timestamp(&bytes, now_timestamp())?;

    ctx.plates
        .apply_capture_time(plate_id, captured_at)
        .await
        .map_err(store_error)?;

    ctx.broadcaster.publish(PlateEvent::MetadataExtracted {
        plate_id,
        captured_at: format_timestamp(captured_at),
    });
    Ok(())
}

async fn process_thumbnail(ctx: &WorkerContext, plate_id: Uuid) -> Result<(), PlateProcessError> {
    let bytes = read_original(ctx, plate_id).await?;
    let quality = ctx.options.jpeg_quality;
    let thumbnail = spawn_blocking(move || ensure_jpeg(&bytes, quality))
        .await
        .map_err(|err| PlateProcessError::Worker(err.to_string()))
        .and_then(|result| result)?;

    ctx.images
        .write_derived(plate_id, THUMBNAIL_SUFFIX, &thumbnail)
        .await
        .map_err(write_error)?;

    ctx.broadcaster.publish(PlateEvent::ThumbnailReady {
        plate_id,
        thumbnail: derived_name(plate_id, THUMBNAIL_SUFFIX),
    });
    Ok(())
}

async fn read_original(ctx: &WorkerContext, plate_id: Uuid) -> Result<Vec<u8>, PlateProcessError> {
    ctx.images
        .read_original(plate_id)
        .await
        .map_err(|err| match err {
            ImageStoreError::NotFound => {
                PlateProcessError::SourceMissing("original image missing".to_string())
            }
            ImageStoreError::Io(detail) => PlateProcessError::SourceMissing(detail),
        })
}

fn store_error(err: PlateStoreError) -> PlateProcessError {
    match err {
        PlateStoreError::NotFound => PlateProcessError::RecordNotFound,
        PlateStoreError::Conflict => PlateProcessError::ConcurrencyConflict,
        PlateStoreError::Database(detail) => PlateProcessError::StorageWrite(detail),
    }
}

fn write_error(err: ImageStoreError) -> PlateProcessError {
    match err {
        ImageStoreError::NotFound => {
            PlateProcessError::StorageWrite("destination missing".to_string())
        }
        ImageStoreError::Io(detail) => PlateProcessError::StorageWrite(detail),
    }
}
