use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::course_tests::load_managed as load_managed_test;
use crate::api::errors::ApiError;
use crate::api::guards::CurrentActor;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Question;
use crate::repositories;
use crate::repositories::questions::CreateQuestion;
use crate::schemas::question::{QuestionInput, QuestionResponse};
use crate::services::access::Actor;
use crate::services::publishing;
use crate::services::question_rules::validate_question;

/// Routes under `/tests/:test_id`.
pub(crate) fn test_router() -> Router<AppState> {
    Router::new().route("/:test_id/questions", get(list_questions).post(create_question))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route(
        "/:question_id",
        get(get_question).put(update_question).delete(delete_question),
    )
}

async fn list_questions(
    Path(test_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    load_managed_test(&state, &actor, &test_id).await?;

    let questions = repositories::questions::list_by_test(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;
    let options = repositories::questions::list_options_by_test(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list answer options"))?;

    Ok(Json(
        questions
            .into_iter()
            .map(|question| QuestionResponse::from_db(question, &options))
            .collect(),
    ))
}

async fn create_question(
    Path(test_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<QuestionInput>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let new_options = payload.new_options();
    validate_question(payload.kind, &payload.text, payload.points, &new_options)?;
    load_managed_test(&state, &actor, &test_id).await?;

    let question_id = Uuid::new_v4().to_string();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let question = repositories::questions::create(
        &mut tx,
        CreateQuestion {
            id: &question_id,
            test_id: &test_id,
            text: payload.text.trim(),
            kind: payload.kind,
            points: payload.points,
            now: primitive_now_utc(),
        },
        &new_options,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit question"))?;

    tracing::info!(
        user_id = %actor.id,
        test_id = %test_id,
        question_id = %question.id,
        options = new_options.len(),
        action = "question_create",
        "Question created"
    );

    Ok((StatusCode::CREATED, Json(question_response(&state, question).await?)))
}

async fn get_question(
    Path(question_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = load_managed(&state, &actor, &question_id).await?;
    Ok(Json(question_response(&state, question).await?))
}

async fn update_question(
    Path(question_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<QuestionInput>,
) -> Result<Json<QuestionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let new_options = payload.new_options();
    validate_question(payload.kind, &payload.text, payload.points, &new_options)?;
    load_managed(&state, &actor, &question_id).await?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let question = repositories::questions::update(
        &mut tx,
        &question_id,
        payload.text.trim(),
        payload.kind,
        payload.points,
        &new_options,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?
    .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit question"))?;

    tracing::info!(
        user_id = %actor.id,
        question_id = %question_id,
        options = new_options.len(),
        action = "question_update",
        "Question updated"
    );

    Ok(Json(question_response(&state, question).await?))
}

async fn delete_question(
    Path(question_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let question = load_managed(&state, &actor, &question_id).await?;
    let test = repositories::course_tests::find_by_id(state.db(), &question.test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch test"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::subjects::lock_by_id(&mut *tx, &test.subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock subject"))?;
    let locked = repositories::course_tests::lock_by_id(&mut *tx, &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock test"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;
    let deleted = repositories::questions::delete(&mut tx, &question_id, &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;
    if !deleted {
        return Err(ApiError::NotFound("Question not found".to_string()));
    }

    // A published test must keep at least one question.
    let remaining = repositories::course_tests::count_questions(&mut *tx, &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    if publishing::evaluate_test(locked.status, remaining).is_err() {
        tracing::info!(
            user_id = %actor.id,
            question_id = %question_id,
            test_id = %test.id,
            "Question delete rejected: last question of a published test"
        );
        return Err(ApiError::Conflict(
            "Cannot delete the last question of a published test".to_string(),
        ));
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit question delete"))?;

    tracing::info!(
        user_id = %actor.id,
        question_id = %question_id,
        test_id = %test.id,
        action = "question_delete",
        "Question deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn load_managed(
    state: &AppState,
    actor: &Actor,
    question_id: &str,
) -> Result<Question, ApiError> {
    let question = repositories::questions::find_by_id(state.db(), question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;
    load_managed_test(state, actor, &question.test_id).await?;
    Ok(question)
}

async fn question_response(
    state: &AppState,
    question: Question,
) -> Result<QuestionResponse, ApiError> {
    let options = repositories::questions::list_options(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list answer options"))?;
    Ok(QuestionResponse::from_db(question, &options))
}

#[cfg(test)]
mod tests;
