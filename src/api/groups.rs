use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::Page;
use crate::api::validation::normalize_ids;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Group;
use crate::repositories;
use crate::schemas::group::{
    GroupCreate, GroupDetailResponse, GroupListQuery, GroupResponse, GroupUpdate,
};
use crate::schemas::user::UserResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/:group_id", get(get_group).put(update_group).delete(delete_group))
}

async fn list_groups(
    Query(params): Query<GroupListQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let page = Page::new(params.skip, params.limit);
    let groups =
        repositories::groups::list(state.db(), params.search.as_deref(), page.skip, page.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list groups"))?;

    Ok(Json(groups.into_iter().map(GroupResponse::from_summary).collect()))
}

async fn get_group(
    Path(group_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<GroupDetailResponse>, ApiError> {
    let group = fetch_group(&state, &group_id).await?;
    detail_response(&state, group).await.map(Json)
}

async fn create_group(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupDetailResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let name = payload.name.trim();
    ensure_name_free(&state, name, None).await?;

    let student_ids = normalize_ids(&payload.student_ids);
    let now = primitive_now_utc();

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let group = repositories::groups::create(&mut *tx, &Uuid::new_v4().to_string(), name, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create group"))?;
    let assigned = repositories::groups::replace_members(&mut tx, &group.id, &student_ids, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to assign group members"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit group"))?;

    tracing::info!(
        admin_id = %admin.id,
        group_id = %group.id,
        students = assigned,
        action = "group_create",
        "Admin created group"
    );

    Ok((StatusCode::CREATED, Json(detail_response(&state, group).await?)))
}

async fn update_group(
    Path(group_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<GroupUpdate>,
) -> Result<Json<GroupDetailResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mut group = fetch_group(&state, &group_id).await?;
    let now = primitive_now_utc();

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    if let Some(name) = payload.name.as_deref().map(str::trim) {
        ensure_name_free(&state, name, Some(&group_id)).await?;
        group = repositories::groups::rename(&mut *tx, &group_id, name, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to rename group"))?
            .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;
    }

    if let Some(student_ids) = payload.student_ids.as_ref() {
        let student_ids = normalize_ids(student_ids);
        repositories::groups::replace_members(&mut tx, &group_id, &student_ids, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to replace group members"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit group"))?;

    tracing::info!(
        admin_id = %admin.id,
        group_id = %group_id,
        action = "group_update",
        "Admin updated group"
    );

    Ok(Json(detail_response(&state, group).await?))
}

async fn delete_group(
    Path(group_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::groups::delete(state.db(), &group_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete group"))?;
    if !deleted {
        return Err(ApiError::NotFound("Group not found".to_string()));
    }

    tracing::info!(
        admin_id = %admin.id,
        group_id = %group_id,
        action = "group_delete",
        "Admin deleted group"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_group(state: &AppState, group_id: &str) -> Result<Group, ApiError> {
    repositories::groups::find_by_id(state.db(), group_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch group"))?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))
}

async fn ensure_name_free(
    state: &AppState,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), ApiError> {
    let taken = repositories::groups::name_taken(state.db(), name, except_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check group name"))?;
    if taken {
        return Err(ApiError::Conflict("Group with this name already exists".to_string()));
    }
    Ok(())
}

async fn detail_response(state: &AppState, group: Group) -> Result<GroupDetailResponse, ApiError> {
    let students = repositories::groups::list_members(state.db(), &group.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list group members"))?;

    Ok(GroupDetailResponse {
        id: group.id,
        name: group.name,
        created_at: format_primitive(group.created_at),
        students: students.into_iter().map(UserResponse::from_db).collect(),
    })
}
