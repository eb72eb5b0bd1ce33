pub(crate) mod events;
pub(crate) mod plates;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use crate::config::Settings;
use crate::db::plates::PlateStore;
use crate::events::Broadcaster;
use crate::jobs::queue::JobQueue;
use crate::storage::ImageStore;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub plates: PlateStore,
    pub images: ImageStore,
    pub broadcaster: Broadcaster,
    pub metadata_queue: Arc<JobQueue>,
    pub thumbnail_queue: Arc<JobQueue>,
    pub settings: Arc<Settings>,
}

pub(crate) fn router(state: AppState) -> Router {
    let max_upload = state.settings.server.max_upload_bytes;
    Router::new()
        .route(
            "/api/plates",
            get(plates::list_plates).post(plates::upload_plates),
        )
        .route(
            "/api/plates/{plate_id}",
            get(plates::get_plate)
                .patch(plates::update_plate)
                .delete(plates::delete_plate),
        )
        .route("/api/plates/{plate_id}/image", get(plates::plate_image))
        .route(
            "/api/plates/{plate_id}/thumbnail",
            get(plates::plate_thumbnail),
        )
        .route(
            "/api/plates/{plate_id}/reprocess",
            post(plates::reprocess_plate),
        )
        .route("/api/events", get(events::subscribe_events))
        .route("/api/jobs/status", get(events::job_status))
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state)
}
