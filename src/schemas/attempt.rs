use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::TestAttempt;
use crate::services::attempts::PresentedQuestion;
use crate::services::grading::{AttemptResult, GradedAnswer};

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSummary {
    pub(crate) id: String,
    pub(crate) started_at: String,
    pub(crate) ended_at: Option<String>,
    pub(crate) score: i32,
    pub(crate) is_completed: bool,
    pub(crate) late: bool,
}

impl AttemptSummary {
    pub(crate) fn from_db(attempt: TestAttempt) -> Self {
        Self {
            id: attempt.id,
            started_at: format_primitive(attempt.started_at),
            ended_at: format_optional(attempt.ended_at),
            score: attempt.score,
            is_completed: attempt.is_completed,
            late: attempt.is_late,
        }
    }
}

/// What a student sees before starting a test.
#[derive(Debug, Serialize)]
pub(crate) struct StartInfoResponse {
    pub(crate) test_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) question_count: i64,
    pub(crate) max_score: i64,
    pub(crate) days_to_complete: Option<i32>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) attempts_used: i64,
    pub(crate) attempts_left: Option<i64>,
    pub(crate) can_start: bool,
    pub(crate) open_attempt_id: Option<String>,
    pub(crate) attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptScreenResponse {
    pub(crate) attempt_id: String,
    pub(crate) test_id: String,
    pub(crate) title: String,
    pub(crate) resumed: bool,
    pub(crate) started_at: String,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) questions: Vec<PresentedQuestion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    /// Selected option ids keyed by question id.
    #[serde(default)]
    pub(crate) answers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResultResponse {
    pub(crate) question_id: String,
    pub(crate) selected_option_ids: Vec<String>,
    pub(crate) points_awarded: i32,
}

impl AnswerResultResponse {
    fn from_graded(answer: GradedAnswer) -> Self {
        Self {
            question_id: answer.question_id,
            selected_option_ids: answer.selected_option_ids,
            points_awarded: answer.points_awarded,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResultResponse {
    pub(crate) attempt_id: String,
    pub(crate) test_id: String,
    pub(crate) score: i32,
    pub(crate) max_score: i64,
    pub(crate) started_at: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) late: bool,
    pub(crate) already_completed: bool,
    pub(crate) answers: Vec<AnswerResultResponse>,
}

impl AttemptResultResponse {
    pub(crate) fn from_result(result: AttemptResult, already_completed: bool) -> Self {
        Self {
            attempt_id: result.attempt.id,
            test_id: result.attempt.test_id,
            score: result.attempt.score,
            max_score: result.max_score,
            started_at: format_primitive(result.attempt.started_at),
            completed_at: format_optional(result.attempt.ended_at),
            late: result.late,
            already_completed,
            answers: result.answers.into_iter().map(AnswerResultResponse::from_graded).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptHistoryResponse {
    pub(crate) test_id: String,
    pub(crate) title: String,
    pub(crate) max_score: i64,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) attempts: Vec<AttemptSummary>,
}
