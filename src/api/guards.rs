use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, SecurityError};
use crate::core::state::AppState;
use crate::db::models::{Subject, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::access::{self, Actor, ContentRef};

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentAdmin(pub(crate) User);
pub(crate) struct CurrentStudent(pub(crate) User);

/// Identity of the caller as seen by the access rules.
pub(crate) struct CurrentActor(pub(crate) Actor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = bearer_token(parts).ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
        let claims = security::decode_access_token(token, app_state.settings().security())
            .map_err(|error| match error {
                SecurityError::Expired => ApiError::Unauthorized("Access token has expired"),
                _ => ApiError::Unauthorized(INVALID_CREDENTIALS),
            })?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        }

        Ok(CurrentUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Admin {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Student {
            Ok(CurrentStudent(user))
        } else {
            Err(ApiError::Forbidden("Only students can take tests"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(CurrentActor(Actor::from_user(&user)))
    }
}

/// Management surfaces: a missing subject is 404, a foreign one is 403.
pub(crate) async fn require_manage(
    state: &AppState,
    actor: &Actor,
    subject_id: &str,
) -> Result<Subject, ApiError> {
    let subject = repositories::subjects::find_by_id(state.db(), subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    let allowed = access::can_manage(state.db(), actor, subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve subject access"))?;

    if allowed {
        Ok(subject)
    } else {
        Err(ApiError::Forbidden("Not enough permissions for this subject"))
    }
}

/// Viewing surfaces report content the actor may not see exactly like missing content.
pub(crate) async fn require_view(
    state: &AppState,
    actor: &Actor,
    content: ContentRef<'_>,
    not_found: &str,
) -> Result<(), ApiError> {
    let allowed = access::can_view(state.db(), actor, content)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve content access"))?;

    if allowed {
        Ok(())
    } else {
        Err(ApiError::NotFound(not_found.to_string()))
    }
}

pub(crate) async fn load_subject(state: &AppState, subject_id: &str) -> Result<Subject, ApiError> {
    repositories::subjects::find_by_id(state.db(), subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))
}
