use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::plates::upload_plates,
        crate::api::plates::list_plates,
        crate::api::plates::get_plate,
        crate::api::plates::update_plate,
        crate::api::plates::delete_plate,
        crate::api::plates::plate_image,
        crate::api::plates::plate_thumbnail,
        crate::api::plates::reprocess_plate,
        crate::api::events::subscribe_events,
        crate::api::events::job_status
    ),
    components(
        schemas(
            crate::api::plates::PlateResponse,
            crate::api::plates::UpdatePlateRequest,
            crate::api::events::JobStatusResponse,
            crate::api_error::ErrorBody
        )
    ),
    tags(
        (name = "plates", description = "Plate records and image files"),
        (name = "events", description = "Completion events and job status")
    )
)]
#[allow(dead_code)]
pub struct ApiDoc;
