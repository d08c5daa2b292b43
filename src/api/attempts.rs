use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentStudent};
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{CourseTest, TestAttempt, User};
use crate::repositories;
use crate::schemas::attempt::{
    AttemptHistoryResponse, AttemptResultResponse, AttemptScreenResponse, AttemptSummary,
    StartInfoResponse, SubmitRequest,
};
use crate::services::access::{Actor, ContentRef};
use crate::services::attempts::{self as attempt_service, StartDecision, StartOutcome};
use crate::services::grading::{self, SubmitOutcome};

/// Routes under `/tests/:test_id`.
pub(crate) fn test_router() -> Router<AppState> {
    Router::new()
        .route("/:test_id/start-info", get(start_info))
        .route("/:test_id/attempts", get(attempt_history).post(start_attempt))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(attempt_screen))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/result", get(attempt_result))
}

async fn start_info(
    Path(test_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<StartInfoResponse>, ApiError> {
    let test = load_visible_test(&state, &student, &test_id).await?;

    let question_count = repositories::course_tests::count_questions(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    let max_score = repositories::course_tests::max_score(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute max score"))?;
    let attempts = repositories::attempts::list_for_student(state.db(), &test.id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    let attempts_used = attempts.iter().filter(|attempt| attempt.is_completed).count() as i64;
    let open_attempt_id =
        attempts.iter().find(|attempt| !attempt.is_completed).map(|attempt| attempt.id.clone());
    let can_start =
        attempt_service::decide_start(open_attempt_id.is_some(), attempts_used, test.max_attempts)
            != StartDecision::Blocked;

    Ok(Json(StartInfoResponse {
        title: test.title.clone(),
        description: test.description.clone(),
        question_count,
        max_score,
        days_to_complete: test.days_to_complete,
        time_limit_minutes: test.time_limit_minutes,
        max_attempts: test.max_attempts,
        attempts_used,
        attempts_left: attempt_service::attempts_left(attempts_used, test.max_attempts),
        can_start,
        open_attempt_id,
        attempts: summaries(attempts),
        test_id: test.id,
    }))
}

async fn attempt_history(
    Path(test_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptHistoryResponse>, ApiError> {
    let test = load_visible_test(&state, &student, &test_id).await?;

    let max_score = repositories::course_tests::max_score(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute max score"))?;
    let attempts = repositories::attempts::list_for_student(state.db(), &test.id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(AttemptHistoryResponse {
        attempts: summaries(attempts),
        test_id: test.id,
        title: test.title,
        max_score,
        max_attempts: test.max_attempts,
    }))
}

async fn start_attempt(
    Path(test_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AttemptScreenResponse>), ApiError> {
    let actor = Actor::from_user(&student);
    let outcome = attempt_service::start_or_resume(state.db(), &actor, &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start attempt"))?;

    let (status, started, resumed) = match outcome {
        StartOutcome::Created(started) => (StatusCode::CREATED, started, false),
        StartOutcome::Resumed(started) => (StatusCode::OK, started, true),
        StartOutcome::Blocked(reason) => {
            let history_url = format!("{}/tests/{}/attempts", state.settings().api().api_v1_str, test_id);
            return Err(ApiError::ConflictWith(
                reason.to_string(),
                json!({ "history_url": history_url }),
            ));
        }
        StartOutcome::NotFound => return Err(ApiError::NotFound("Test not found".to_string())),
    };

    let screen = attempt_screen_response(&state, started.attempt, &started.test, resumed).await?;
    Ok((status, Json(screen)))
}

async fn attempt_screen(
    Path(attempt_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptScreenResponse>, ApiError> {
    let attempt = load_own_attempt(&state, &student, &attempt_id).await?;
    if attempt.is_completed {
        return Err(ApiError::Conflict("Attempt is already completed".to_string()));
    }
    let test = load_visible_test(&state, &student, &attempt.test_id).await?;

    Ok(Json(attempt_screen_response(&state, attempt, &test, true).await?))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<AttemptResultResponse>, ApiError> {
    let outcome = grading::submit(state.db(), &attempt_id, &student.id, &payload.answers)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to submit attempt"))?;

    match outcome {
        SubmitOutcome::Graded(result) => Ok(Json(AttemptResultResponse::from_result(result, false))),
        SubmitOutcome::AlreadyCompleted(result) => {
            Ok(Json(AttemptResultResponse::from_result(result, true)))
        }
        SubmitOutcome::NotFound => Err(ApiError::NotFound("Attempt not found".to_string())),
    }
}

async fn attempt_result(
    Path(attempt_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptResultResponse>, ApiError> {
    let attempt = load_own_attempt(&state, &student, &attempt_id).await?;
    if !attempt.is_completed {
        return Err(ApiError::Conflict("Attempt is still in progress".to_string()));
    }

    let result = grading::load_result(state.db(), attempt)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt result"))?;
    Ok(Json(AttemptResultResponse::from_result(result, true)))
}

async fn load_visible_test(
    state: &AppState,
    student: &User,
    test_id: &str,
) -> Result<CourseTest, ApiError> {
    let test = repositories::course_tests::find_by_id(state.db(), test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;
    let subject = repositories::subjects::find_by_id(state.db(), &test.subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    guards::require_view(
        state,
        &Actor::from_user(student),
        ContentRef::test(&subject, test.status),
        "Test not found",
    )
    .await?;
    Ok(test)
}

/// Attempts of other students look exactly like missing ones.
async fn load_own_attempt(
    state: &AppState,
    student: &User,
    attempt_id: &str,
) -> Result<TestAttempt, ApiError> {
    repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .filter(|attempt| attempt.student_id == student.id)
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))
}

async fn attempt_screen_response(
    state: &AppState,
    attempt: TestAttempt,
    test: &CourseTest,
    resumed: bool,
) -> Result<AttemptScreenResponse, ApiError> {
    let questions = attempt_service::load_presentation(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
    let remaining_seconds = attempt_service::remaining_seconds(
        attempt.started_at,
        test.time_limit_minutes,
        primitive_now_utc(),
    );

    Ok(AttemptScreenResponse {
        attempt_id: attempt.id,
        test_id: test.id.clone(),
        title: test.title.clone(),
        resumed,
        started_at: format_primitive(attempt.started_at),
        time_limit_minutes: test.time_limit_minutes,
        remaining_seconds,
        questions,
    })
}

fn summaries(attempts: Vec<TestAttempt>) -> Vec<AttemptSummary> {
    attempts.into_iter().map(AttemptSummary::from_db).collect()
}

#[cfg(test)]
mod tests;
