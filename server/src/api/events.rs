use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Serialize, ToSchema)]
pub(crate) struct JobStatusResponse {
    metadata_queued: usize,
    thumbnail_queued: usize,
    observers: usize,
}

#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    summary = "Completion event stream",
    description = "Server-sent events, one per finished job: event name is the job's\ncompletion tag (`MetadataExtracted` or `ThumbnailReady`), data is the\nevent payload string. Events published before a client connects are\nnot replayed.",
    responses(
        (status = 200, description = "SSE stream of completion events")
    )
)]
pub async fn subscribe_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream =
        BroadcastStream::new(state.broadcaster.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => Some(Ok(Event::default()
                    .event(event.event_type())
                    .data(event.payload()))),
                Err(err) => {
                    tracing::warn!(error = %err, "event stream lagged");
                    None
                }
            }
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

#[utoipa::path(
    get,
    path = "/api/jobs/status",
    tag = "events",
    summary = "Queue depths and live event observers",
    responses(
        (status = 200, description = "Current processing status", body = JobStatusResponse)
    )
)]
pub async fn job_status(State(state): State<AppState>) -> Json<JobStatusResponse> {
    Json(JobStatusResponse {
        metadata_queued: state.metadata_queue.len(),
        thumbnail_queued: state.thumbnail_queue.len(),
        observers: state.broadcaster.observer_count(),
    })
}
