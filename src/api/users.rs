use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::{Page, PaginatedResponse};
use crate::api::validation::validate_password_len;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::user::{
    AdminUserCreate, AdminUserUpdate, UserGroupUpdate, UserListQuery, UserResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", get(get_user).patch(update_user).delete(delete_user))
        .route("/:user_id/group", put(set_user_group))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    let filter = repositories::users::UserFilter {
        role: params.role,
        group_id: params.group_id,
        search: params.search,
    };
    let page = Page::new(params.skip, params.limit);

    let users = repositories::users::list(state.db(), &filter, page.skip, page.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list users"))?;
    let total_count = repositories::users::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count users"))?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from_db).collect(),
        total_count,
        page,
    )))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = fetch_user(&state, &user_id).await?;
    Ok(Json(UserResponse::from_db(user)))
}

async fn create_user(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AdminUserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validate_password_len(&payload.password)?;

    let email = payload.email.trim().to_lowercase();
    let existing = repositories::users::exists_by_email(state.db(), &email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User with this email already exists".to_string()));
    }

    let group_id = match payload.group_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(_) if payload.role != UserRole::Student => {
            return Err(ApiError::BadRequest("Only students can belong to a group".to_string()));
        }
        Some(group_id) => {
            ensure_group_exists(&state, group_id).await?;
            Some(group_id)
        }
        None => None,
    };

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &email,
            hashed_password,
            full_name: payload.full_name.trim(),
            role: payload.role,
            group_id,
            is_active: payload.is_active,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %user.id,
        role = ?user.role,
        action = "user_create",
        "Admin created user"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn update_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AdminUserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    fetch_user(&state, &user_id).await?;

    let demotes_self = payload.is_active == Some(false)
        || payload.role.is_some_and(|role| role != UserRole::Admin);
    if user_id == admin.id && demotes_self {
        return Err(ApiError::BadRequest(
            "Admins cannot demote or deactivate themselves".to_string(),
        ));
    }

    let email = payload.email.as_deref().map(|email| email.trim().to_lowercase());
    if let Some(email) = email.as_deref() {
        let existing = repositories::users::exists_by_email(state.db(), email)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
        if existing.is_some_and(|id| id != user_id) {
            return Err(ApiError::Conflict("User with this email already exists".to_string()));
        }
    }

    let hashed_password = match payload.password.as_deref() {
        Some(password) => {
            validate_password_len(password)?;
            Some(
                security::hash_password(password)
                    .map_err(|e| ApiError::internal(e, "Failed to hash password"))?,
            )
        }
        None => None,
    };

    let updated = repositories::users::update(
        state.db(),
        &user_id,
        repositories::users::UpdateUser {
            full_name: payload.full_name.map(|name| name.trim().to_string()),
            email,
            role: payload.role,
            is_active: payload.is_active,
            hashed_password,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update user"))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %updated.id,
        action = "user_update",
        "Admin updated user"
    );

    Ok(Json(UserResponse::from_db(updated)))
}

async fn delete_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if user_id == admin.id {
        return Err(ApiError::BadRequest("Admins cannot delete themselves".to_string()));
    }

    let deleted = repositories::users::delete(state.db(), &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete user"))?;
    if !deleted {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(
        admin_id = %admin.id,
        user_id = %user_id,
        action = "user_delete",
        "Admin deleted user"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn set_user_group(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<UserGroupUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = fetch_user(&state, &user_id).await?;
    if user.role != UserRole::Student {
        return Err(ApiError::BadRequest("Only students can belong to a group".to_string()));
    }

    let group_id = payload.group_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    if let Some(group_id) = group_id {
        ensure_group_exists(&state, group_id).await?;
    }

    repositories::users::set_group(state.db(), &user_id, group_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update user group"))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %user_id,
        group_id = ?group_id,
        action = "user_set_group",
        "Admin changed student group"
    );

    let user = fetch_user(&state, &user_id).await?;
    Ok(Json(UserResponse::from_db(user)))
}

async fn fetch_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    repositories::users::find_by_id(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

async fn ensure_group_exists(state: &AppState, group_id: &str) -> Result<(), ApiError> {
    repositories::groups::find_by_id(state.db(), group_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch group"))?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))
}
