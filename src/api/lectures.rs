use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentActor};
use crate::api::validation::validate_lecture_extension;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Lecture, Subject};
use crate::db::types::LectureStatus;
use crate::repositories;
use crate::schemas::lecture::{LectureDownloadResponse, LectureResponse, LectureUpdate};
use crate::schemas::{StatusChangeResponse, StatusUpdate};
use crate::services::access::{self, Actor, ContentRef};
use crate::services::lectures::{self as lecture_service, LectureUpload};
use crate::services::publishing::{self, StatusChange};

/// Multipart overhead allowed on top of the configured file size.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Routes under `/subjects/:subject_id`.
pub(crate) fn subject_router(max_upload_bytes: u64) -> Router<AppState> {
    Router::new().route(
        "/:subject_id/lectures",
        get(list_lectures).post(upload_lecture).layer(body_limit(max_upload_bytes)),
    )
}

pub(crate) fn router(max_upload_bytes: u64) -> Router<AppState> {
    Router::new()
        .route("/:lecture_id", get(get_lecture).patch(update_lecture).delete(delete_lecture))
        .route("/:lecture_id/file", put(replace_file).layer(body_limit(max_upload_bytes)))
        .route("/:lecture_id/status", put(change_status))
        .route("/:lecture_id/download", get(download_lecture))
}

fn body_limit(max_upload_bytes: u64) -> DefaultBodyLimit {
    let limit = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);
    DefaultBodyLimit::max(limit.saturating_add(MULTIPART_OVERHEAD_BYTES))
}

#[derive(Debug, Default)]
struct LectureForm {
    title: Option<String>,
    status: Option<LectureStatus>,
    upload: Option<LectureUpload>,
}

async fn read_lecture_form(state: &AppState, mut multipart: Multipart) -> Result<LectureForm, ApiError> {
    let storage_settings = state.settings().storage();
    let max_bytes = storage_settings.max_upload_bytes();
    let mut form = LectureForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;
                let extension = validate_lecture_extension(
                    &filename,
                    &storage_settings.allowed_lecture_extensions,
                )?;

                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    let next_size = bytes.len() as u64 + chunk.len() as u64;
                    if next_size > max_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File size exceeds {}MB limit",
                            storage_settings.max_upload_size_mb
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest("File is empty".to_string()));
                }
                form.upload = Some(LectureUpload { filename, extension, bytes });
            }
            "title" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid title".to_string()))?;
                form.title = Some(text.trim().to_string());
            }
            "status" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid status".to_string()))?;
                let status = serde_json::from_value(serde_json::Value::String(text.trim().to_lowercase()))
                    .map_err(|_| ApiError::BadRequest("Unknown lecture status".to_string()))?;
                form.status = Some(status);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn list_lectures(
    Path(subject_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<Vec<LectureResponse>>, ApiError> {
    let subject = guards::load_subject(&state, &subject_id).await?;
    let can_manage = access::can_manage(state.db(), &actor, &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve subject access"))?;
    if !can_manage {
        guards::require_view(&state, &actor, ContentRef::subject(&subject), "Subject not found")
            .await?;
    }

    let lectures = repositories::lectures::list_by_subject(state.db(), &subject_id, !can_manage)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list lectures"))?;

    Ok(Json(lectures.into_iter().map(LectureResponse::from_db).collect()))
}

async fn upload_lecture(
    Path(subject_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<LectureResponse>), ApiError> {
    guards::require_manage(&state, &actor, &subject_id).await?;

    let form = read_lecture_form(&state, multipart).await?;
    let title = form
        .title
        .filter(|title| !title.is_empty())
        .ok_or_else(|| ApiError::BadRequest("title is required".to_string()))?;
    if title.chars().count() > 200 {
        return Err(ApiError::BadRequest("title must be 1-200 characters".to_string()));
    }

    let lecture = lecture_service::create_lecture(
        state.db(),
        state.storage(),
        &subject_id,
        &title,
        form.status.unwrap_or(LectureStatus::Hidden),
        form.upload,
    )
    .await?;

    tracing::info!(
        user_id = %actor.id,
        subject_id = %subject_id,
        lecture_id = %lecture.id,
        action = "lecture_create",
        "Lecture created"
    );

    Ok((StatusCode::CREATED, Json(LectureResponse::from_db(lecture))))
}

async fn get_lecture(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<LectureResponse>, ApiError> {
    let (lecture, _subject) = load_viewable(&state, &actor, &lecture_id).await?;
    Ok(Json(LectureResponse::from_db(lecture)))
}

async fn update_lecture(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<LectureUpdate>,
) -> Result<Json<LectureResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    load_managed(&state, &actor, &lecture_id).await?;

    repositories::lectures::update_title(
        state.db(),
        &lecture_id,
        payload.title.trim(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update lecture"))?;

    let lecture = fetch_lecture(&state, &lecture_id).await?;
    Ok(Json(LectureResponse::from_db(lecture)))
}

async fn replace_file(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<LectureResponse>, ApiError> {
    load_managed(&state, &actor, &lecture_id).await?;

    let form = read_lecture_form(&state, multipart).await?;
    let upload = form.upload.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;

    let lecture =
        lecture_service::replace_file(state.db(), state.storage(), &lecture_id, upload).await?;

    tracing::info!(
        user_id = %actor.id,
        lecture_id = %lecture_id,
        action = "lecture_replace_file",
        "Lecture file replaced"
    );

    Ok(Json(LectureResponse::from_db(lecture)))
}

async fn delete_lecture(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    load_managed(&state, &actor, &lecture_id).await?;
    lecture_service::delete_lecture(state.db(), state.storage(), &lecture_id).await?;

    tracing::info!(
        user_id = %actor.id,
        lecture_id = %lecture_id,
        action = "lecture_delete",
        "Lecture deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn change_status(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<StatusUpdate<LectureStatus>>,
) -> Result<Json<StatusChangeResponse>, ApiError> {
    let (lecture, _subject) = load_managed(&state, &actor, &lecture_id).await?;

    let outcome = publishing::request_status_change(
        state.db(),
        &StatusChange::Lecture { id: lecture_id, status: payload.status },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to change lecture status"))?;

    StatusChangeResponse::from_outcome(outcome, payload.status.as_str(), lecture.status.as_str())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Lecture not found".to_string()))
}

async fn download_lecture(
    Path(lecture_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<LectureDownloadResponse>, ApiError> {
    let (lecture, _subject) = load_viewable(&state, &actor, &lecture_id).await?;
    let key = lecture
        .file_path
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("Lecture has no file".to_string()))?;
    let storage = state
        .storage()
        .ok_or_else(|| ApiError::ServiceUnavailable("File storage is not configured".to_string()))?;

    let expires_in_seconds = state.settings().storage().presigned_url_expire_minutes * 60;
    let url = storage
        .presign_get(key, lecture.original_filename.as_deref(), Duration::from_secs(expires_in_seconds))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create download link"))?;

    tracing::info!(user_id = %actor.id, lecture_id = %lecture.id, "Lecture download link issued");

    Ok(Json(LectureDownloadResponse {
        url,
        filename: lecture.original_filename,
        expires_in_seconds,
    }))
}

async fn fetch_lecture(state: &AppState, lecture_id: &str) -> Result<Lecture, ApiError> {
    repositories::lectures::find_by_id(state.db(), lecture_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch lecture"))?
        .ok_or_else(|| ApiError::NotFound("Lecture not found".to_string()))
}

async fn load_viewable(
    state: &AppState,
    actor: &Actor,
    lecture_id: &str,
) -> Result<(Lecture, Subject), ApiError> {
    let lecture = fetch_lecture(state, lecture_id).await?;
    let subject = guards::load_subject(state, &lecture.subject_id).await?;
    guards::require_view(
        state,
        actor,
        ContentRef::lecture(&subject, lecture.status),
        "Lecture not found",
    )
    .await?;
    Ok((lecture, subject))
}

async fn load_managed(
    state: &AppState,
    actor: &Actor,
    lecture_id: &str,
) -> Result<(Lecture, Subject), ApiError> {
    let lecture = fetch_lecture(state, lecture_id).await?;
    let subject = guards::require_manage(state, actor, &lecture.subject_id).await?;
    Ok((lecture, subject))
}

#[cfg(test)]
mod tests;
