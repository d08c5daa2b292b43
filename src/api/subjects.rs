use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentActor, CurrentAdmin, CurrentUser};
use crate::api::pagination::Page;
use crate::api::validation::normalize_ids;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Subject;
use crate::db::types::{SubjectStatus, UserRole};
use crate::repositories;
use crate::repositories::subjects::SubjectScope;
use crate::schemas::course_test::CourseTestResponse;
use crate::schemas::lecture::LectureResponse;
use crate::schemas::subject::{
    SubjectCreate, SubjectDetailResponse, SubjectGroupsUpdate, SubjectListQuery, SubjectResponse,
    SubjectUpdate,
};
use crate::schemas::{StatusChangeResponse, StatusUpdate};
use crate::services::access::{self, ContentRef};
use crate::services::publishing::{self, StatusChange};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route("/:subject_id", get(get_subject).patch(update_subject).delete(delete_subject))
        .route("/:subject_id/groups", put(replace_groups))
        .route("/:subject_id/status", put(change_status))
}

async fn list_subjects(
    Query(params): Query<SubjectListQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectResponse>>, ApiError> {
    let scope = match user.role {
        UserRole::Admin => SubjectScope::All,
        UserRole::Teacher => SubjectScope::TaughtBy(user.id.clone()),
        UserRole::Student => match user.group_id.clone() {
            Some(group_id) => SubjectScope::PublishedForGroup(group_id),
            None => return Ok(Json(Vec::new())),
        },
    };

    let page = Page::new(params.skip, params.limit);
    let subjects = repositories::subjects::list(
        state.db(),
        &scope,
        params.search.as_deref(),
        page.skip,
        page.limit,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list subjects"))?;

    Ok(Json(subjects.into_iter().map(SubjectResponse::from_db).collect()))
}

async fn create_subject(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectCreate>,
) -> Result<(StatusCode, Json<SubjectDetailResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let teacher_ids = normalize_ids(&payload.teacher_ids);

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let subject = repositories::subjects::create(
        &mut *tx,
        repositories::subjects::CreateSubject {
            id: &Uuid::new_v4().to_string(),
            title: payload.title.trim(),
            description: payload.description.trim(),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create subject"))?;
    repositories::enrollment::replace_teachers(&mut tx, &subject.id, &teacher_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to assign teachers"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit subject"))?;

    tracing::info!(
        admin_id = %admin.id,
        subject_id = %subject.id,
        action = "subject_create",
        "Admin created subject"
    );

    let detail = detail_response(&state, subject, true).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_subject(
    Path(subject_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<SubjectDetailResponse>, ApiError> {
    let subject = guards::load_subject(&state, &subject_id).await?;
    let can_manage = access::can_manage(state.db(), &actor, &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve subject access"))?;
    if !can_manage {
        guards::require_view(&state, &actor, ContentRef::subject(&subject), "Subject not found")
            .await?;
    }

    Ok(Json(detail_response(&state, subject, can_manage).await?))
}

async fn update_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectUpdate>,
) -> Result<Json<SubjectDetailResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let subject = repositories::subjects::update_details(
        &mut *tx,
        &subject_id,
        payload.title.as_deref().map(str::trim),
        payload.description.as_deref().map(str::trim),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update subject"))?
    .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    if let Some(teacher_ids) = payload.teacher_ids.as_ref() {
        repositories::enrollment::replace_teachers(&mut tx, &subject_id, &normalize_ids(teacher_ids))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to replace teachers"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit subject"))?;

    tracing::info!(
        admin_id = %admin.id,
        subject_id = %subject_id,
        action = "subject_update",
        "Admin updated subject"
    );

    Ok(Json(detail_response(&state, subject, true).await?))
}

async fn delete_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let file_paths = repositories::lectures::file_paths_for_subject(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to collect lecture files"))?;

    let deleted = repositories::subjects::delete(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete subject"))?;
    if !deleted {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    if let Some(storage) = state.storage() {
        storage.delete_best_effort(&file_paths).await;
    }

    tracing::info!(
        admin_id = %admin.id,
        subject_id = %subject_id,
        files = file_paths.len(),
        action = "subject_delete",
        "Admin deleted subject"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_groups(
    Path(subject_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<SubjectGroupsUpdate>,
) -> Result<Json<SubjectDetailResponse>, ApiError> {
    let subject = guards::require_manage(&state, &actor, &subject_id).await?;
    let group_ids = normalize_ids(&payload.group_ids);

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let enrolled = repositories::enrollment::replace_groups(&mut tx, &subject_id, &group_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to replace enrolled groups"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit enrollment"))?;

    tracing::info!(
        user_id = %actor.id,
        subject_id = %subject_id,
        groups = enrolled,
        action = "subject_enroll_groups",
        "Subject groups replaced"
    );

    Ok(Json(detail_response(&state, subject, true).await?))
}

async fn change_status(
    Path(subject_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<StatusUpdate<SubjectStatus>>,
) -> Result<Json<StatusChangeResponse>, ApiError> {
    let subject = guards::require_manage(&state, &actor, &subject_id).await?;

    let outcome = publishing::request_status_change(
        state.db(),
        &StatusChange::Subject { id: subject_id, status: payload.status },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to change subject status"))?;

    StatusChangeResponse::from_outcome(outcome, payload.status.as_str(), subject.status.as_str())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))
}

async fn detail_response(
    state: &AppState,
    subject: Subject,
    can_manage: bool,
) -> Result<SubjectDetailResponse, ApiError> {
    let published_only = !can_manage;
    let lectures = repositories::lectures::list_by_subject(state.db(), &subject.id, published_only)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list lectures"))?;
    let tests = repositories::course_tests::list_by_subject(state.db(), &subject.id, published_only)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tests"))?;

    let (teacher_ids, group_ids) = if can_manage {
        let teacher_ids = repositories::enrollment::teacher_ids(state.db(), &subject.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list subject teachers"))?;
        let group_ids = repositories::enrollment::group_ids(state.db(), &subject.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list subject groups"))?;
        (Some(teacher_ids), Some(group_ids))
    } else {
        (None, None)
    };

    Ok(SubjectDetailResponse {
        subject: SubjectResponse::from_db(subject),
        can_manage,
        teacher_ids,
        group_ids,
        lectures: lectures.into_iter().map(LectureResponse::from_db).collect(),
        tests: tests.into_iter().map(CourseTestResponse::from_summary).collect(),
    })
}
