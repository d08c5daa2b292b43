use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::services::lectures::LectureError;
use crate::services::question_rules::QuestionRuleError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Conflict whose body carries extra fields next to `status` and `detail`.
    ConflictWith(String, Value),
    PayloadTooLarge(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

fn plain(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = plain(StatusCode::UNAUTHORIZED, message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => plain(StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => plain(StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => plain(StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => plain(StatusCode::CONFLICT, message),
            ApiError::ConflictWith(message, extra) => {
                let status = StatusCode::CONFLICT;
                let mut body = serde_json::json!({ "status": status.as_u16(), "detail": message });
                if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
                    for (key, value) in extra {
                        body.entry(key).or_insert(value);
                    }
                }
                (status, Json(body)).into_response()
            }
            ApiError::PayloadTooLarge(message) => plain(StatusCode::PAYLOAD_TOO_LARGE, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                plain(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                plain(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl From<QuestionRuleError> for ApiError {
    fn from(err: QuestionRuleError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<LectureError> for ApiError {
    fn from(err: LectureError) -> Self {
        match err {
            LectureError::NotFound => ApiError::NotFound("Lecture not found".to_string()),
            LectureError::StorageUnavailable => {
                ApiError::ServiceUnavailable("File storage is not configured".to_string())
            }
            LectureError::Rejected(rejection) => ApiError::BadRequest(rejection.reason()),
            LectureError::Storage(err) => ApiError::internal(err, "Failed to store lecture file"),
            LectureError::Database(err) => ApiError::internal(err, "Failed to save lecture"),
        }
    }
}
