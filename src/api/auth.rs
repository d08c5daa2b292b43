use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security;
use crate::core::state::AppState;
use crate::db::models::User;
use crate::repositories;
use crate::schemas::auth::TokenResponse;
use crate::schemas::user::{UserLogin, UserResponse};

const INVALID_CREDENTIALS: &str = "Incorrect email or password";

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<UserLogin>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let user = authenticate(&state, &payload).await?;
    if !user.is_active {
        tracing::info!(user_id = %user.id, "Login rejected: account disabled");
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    let issued = security::issue_access_token(&user, state.settings().security())
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;
    tracing::info!(user_id = %user.id, role = ?user.role, "User logged in");

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in_seconds,
        user: UserResponse::from_db(user),
    }))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

/// Unknown email and wrong password produce the same error.
async fn authenticate(state: &AppState, payload: &UserLogin) -> Result<User, ApiError> {
    let user = repositories::users::find_by_email(state.db(), payload.email.trim())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    match security::verify_password(&payload.password, &user.hashed_password) {
        Ok(true) => Ok(user),
        Ok(false) => {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            Err(ApiError::Unauthorized(INVALID_CREDENTIALS))
        }
        Err(err) => {
            tracing::error!(user_id = %user.id, error = %err, "Stored password hash is unusable");
            Err(ApiError::Unauthorized(INVALID_CREDENTIALS))
        }
    }
}
