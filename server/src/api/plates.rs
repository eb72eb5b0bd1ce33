use std::io::ErrorKind;
use std::path::Path as FilePath;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{Response, StatusCode, header},
};
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::AppState;
use crate::api_error::ApiError;
use crate::db::plates::{Plate, PlateStoreError};
use crate::jobs::metadata::{format_timestamp, now_timestamp};
use crate::jobs::thumbnail::ensure_jpeg;
use crate::storage::{THUMBNAIL_SUFFIX, derived_name};

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize, ToSchema)]
pub(crate) struct PlateResponse {
    id: Uuid,
    created_at: String,
    description: Option<String>,
    owner: String,
    version: i64,
    thumbnail: String,
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct UpdatePlateRequest {
    /// New description; null clears it.
    description: Option<String>,
    /// Version token from the last read. The edit is rejected when stale.
    version: i64,
}

#[utoipa::path(
    post,
    path = "/api/plates",
    tag = "plates",
    summary = "Upload plate images",
    description = "Accepts a multipart form with one or more image files plus optional\n`description` and `owner` text fields applied to every file.\nEach image is normalized to JPEG, stored, and queued for metadata\nextraction and thumbnail generation.",
    responses(
        (status = 201, description = "Created plate records", body = Vec<PlateResponse>),
        (status = 400, description = "Malformed form data or unsupported image")
    )
)]
pub async fn upload_plates(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<PlateResponse>>)> {
    let mut description: Option<String> = None;
    let mut owner = String::new();
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() || name == "files" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            files.push((filename, bytes.to_vec()));
        } else if name == "description" {
            description = Some(field.text().await.map_err(multipart_error)?);
        } else if name == "owner" {
            owner = field.text().await.map_err(multipart_error)?;
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No image files in upload"));
    }

    // Validate and normalize everything before touching storage, so a bad
    // file rejects the whole upload without leaving partial records.
    let quality = state.settings.processing.jpeg_quality;
    let mut normalized = Vec::new();
    for (filename, bytes) in files {
        let jpeg = spawn_blocking(move || ensure_jpeg(&bytes, quality))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "image normalization task failed");
                ApiError::internal("Failed to process upload")
            })?
            .map_err(|err| {
                tracing::warn!(error = ?err, file = %filename, "rejected upload");
                ApiError::bad_request(format!("Unsupported image: {filename}"))
            })?;
        normalized.push(jpeg);
    }

    let mut created = Vec::new();
    for jpeg in normalized {
        let plate = Plate {
            id: Uuid::new_v4(),
            created_at: now_timestamp(),
            description: description.clone(),
            owner: owner.clone(),
            version: 0,
        };
        state
            .images
            .write_original(plate.id, &jpeg)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, plate_id = %plate.id, "failed to store original");
                ApiError::internal("Failed to store image")
            })?;
        state.plates.insert(&plate).await.map_err(store_error)?;
        state.metadata_queue.enqueue(plate.id);
        state.thumbnail_queue.enqueue(plate.id);
        created.push(plate_response(&plate));
    }

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/plates",
    tag = "plates",
    summary = "List all plates, newest first",
    responses(
        (status = 200, description = "Plate records", body = Vec<PlateResponse>)
    )
)]
pub async fn list_plates(State(state): State<AppState>) -> ApiResult<Json<Vec<PlateResponse>>> {
    let plates = state.plates.list().await.map_err(store_error)?;
    Ok(Json(plates.iter().map(plate_response).collect()))
}

#[utoipa::path(
    get,
    path = "/api/plates/{plate_id}",
    tag = "plates",
    summary = "Get one plate",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 200, description = "Plate record", body = PlateResponse),
        (status = 404, description = "No such plate")
    )
)]
pub async fn get_plate(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
) -> ApiResult<Json<PlateResponse>> {
    let plate = state.plates.get(plate_id).await.map_err(store_error)?;
    Ok(Json(plate_response(&plate)))
}

#[utoipa::path(
    patch,
    path = "/api/plates/{plate_id}",
    tag = "plates",
    summary = "Edit a plate's description",
    description = "Optimistically-locked edit: the request carries the version token from\nthe last read and fails with 409 when another edit got there first.",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 200, description = "Updated plate record", body = PlateResponse),
        (status = 404, description = "No such plate"),
        (status = 409, description = "Version token is stale")
    )
)]
pub async fn update_plate(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
    Json(request): Json<UpdatePlateRequest>,
) -> ApiResult<Json<PlateResponse>> {
    state
        .plates
        .update_details(plate_id, request.description.as_deref(), request.version)
        .await
        .map_err(store_error)?;
    let plate = state.plates.get(plate_id).await.map_err(store_error)?;
    Ok(Json(plate_response(&plate)))
}

#[utoipa::path(
    delete,
    path = "/api/plates/{plate_id}",
    tag = "plates",
    summary = "Delete a plate and its stored images",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 204, description = "Plate deleted"),
        (status = 404, description = "No such plate")
    )
)]
pub async fn delete_plate(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.plates.delete(plate_id).await.map_err(store_error)?;
    state.images.remove(plate_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/plates/{plate_id}/image",
    tag = "plates",
    summary = "Get the original image",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 200, description = "Original JPEG bytes"),
        (status = 404, description = "No such plate or image")
    )
)]
pub async fn plate_image(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
) -> ApiResult<Response<Body>> {
    state.plates.get(plate_id).await.map_err(store_error)?;
    let path = state.images.original_path(plate_id);
    file_response(&path, &format!("{plate_id}.jpeg")).await
}

#[utoipa::path(
    get,
    path = "/api/plates/{plate_id}/thumbnail",
    tag = "plates",
    summary = "Get the derived thumbnail",
    description = "404 until the thumbnail job has completed for this plate.",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 200, description = "Thumbnail JPEG bytes"),
        (status = 404, description = "No such plate or thumbnail not generated yet")
    )
)]
pub async fn plate_thumbnail(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
) -> ApiResult<Response<Body>> {
    state.plates.get(plate_id).await.map_err(store_error)?;
    let path = state.images.derived_path(plate_id, THUMBNAIL_SUFFIX);
    file_response(&path, &derived_name(plate_id, THUMBNAIL_SUFFIX)).await
}

#[utoipa::path(
    post,
    path = "/api/plates/{plate_id}/reprocess",
    tag = "plates",
    summary = "Re-enqueue both processing jobs for a plate",
    description = "Recovery path for failed jobs: puts the plate back on the metadata\nand thumbnail queues. Processing happens asynchronously.",
    params(("plate_id" = Uuid, Path, description = "Plate id")),
    responses(
        (status = 202, description = "Jobs enqueued"),
        (status = 404, description = "No such plate")
    )
)]
pub async fn reprocess_plate(
    State(state): State<AppState>,
    Path(plate_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.plates.get(plate_id).await.map_err(store_error)?;
    state.metadata_queue.enqueue(plate_id);
    state.thumbnail_queue.enqueue(plate_id);
    Ok(StatusCode::ACCEPTED)
}

fn plate_response(plate: &Plate) -> PlateResponse {
    PlateResponse {
        id: plate.id,
        created_at: format_timestamp(plate.created_at),
        description: plate.description.clone(),
        owner: plate.owner.clone(),
        version: plate.version,
        thumbnail: derived_name(plate.id, THUMBNAIL_SUFFIX),
    }
}

fn store_error(err: PlateStoreError) -> ApiError {
    match err {
        PlateStoreError::NotFound => ApiError::not_found("Plate not found"),
        PlateStoreError::Conflict => ApiError::conflict("Version token is stale"),
        PlateStoreError::Database(detail) => {
            tracing::error!(error = %detail, "plate store query failed");
            ApiError::internal("Database error")
        }
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::bad_request(format!("Malformed multipart body: {err}"))
}

async fn file_response(path: &FilePath, filename: &str) -> ApiResult<Response<Body>> {
    let file = tokio::fs::File::open(path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            ApiError::not_found("Image not found")
        } else {
            tracing::error!(error = %err, path = %path.display(), "failed to open image file");
            ApiError::internal("Failed to read image")
        }
    })?;
    let metadata = file.metadata().await.map_err(|err| {
        tracing::error!(error = %err, path = %path.display(), "failed to stat image file");
        ApiError::internal("Failed to read image")
    })?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("image/jpeg"),
    );
    if let Ok(value) = header::HeaderValue::from_str(&metadata.len().to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    if let Ok(modified) = metadata.modified() {
        let formatted = httpdate::fmt_http_date(modified);
        if let Ok(value) = header::HeaderValue::from_str(&formatted) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    if let Ok(value) = header::HeaderValue::from_str(&format!("inline; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
