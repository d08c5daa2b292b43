use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::core::{metrics, time::primitive_now_utc};
use crate::db::models::{AnswerOption, Question, TestAttempt};
use crate::db::types::QuestionKind;
use crate::repositories;

/// Added to the time limit before an attempt counts as late.
pub(crate) const GRACE_PERIOD: Duration = Duration::minutes(1);

pub(crate) fn is_late(
    started_at: PrimitiveDateTime,
    ended_at: PrimitiveDateTime,
    time_limit_minutes: Option<i32>,
) -> bool {
    match time_limit_minutes {
        Some(limit) if limit > 0 => {
            ended_at - started_at > Duration::minutes(i64::from(limit)) + GRACE_PERIOD
        }
        _ => false,
    }
}

pub(crate) fn is_answer_correct(
    kind: QuestionKind,
    correct: &HashSet<&str>,
    selected: &HashSet<&str>,
) -> bool {
    match kind {
        QuestionKind::Single => {
            selected.len() == 1 && selected.iter().all(|option| correct.contains(option))
        }
        QuestionKind::Multiple => !selected.is_empty() && selected == correct,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GradedAnswer {
    pub(crate) question_id: String,
    pub(crate) selected_option_ids: Vec<String>,
    pub(crate) points_awarded: i32,
}

/// Grades submitted selections against the stored questions.
///
/// Selections naming options of other questions are dropped. Questions left
/// with no selection are skipped and yield no answer.
pub(crate) fn grade(
    questions: &[Question],
    options: &[AnswerOption],
    submitted: &HashMap<String, Vec<String>>,
) -> (Vec<GradedAnswer>, i32) {
    let mut owned: HashMap<&str, Vec<&AnswerOption>> = HashMap::new();
    for option in options {
        owned.entry(option.question_id.as_str()).or_default().push(option);
    }

    let mut graded = Vec::new();
    let mut score = 0;
    for question in questions {
        let Some(raw) = submitted.get(&question.id) else {
            continue;
        };
        let question_options = owned.get(question.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);

        let mut selected: Vec<&str> = question_options
            .iter()
            .map(|option| option.id.as_str())
            .filter(|id| raw.iter().any(|picked| picked == id))
            .collect();
        selected.dedup();
        if selected.is_empty() {
            continue;
        }

        let correct: HashSet<&str> = question_options
            .iter()
            .filter(|option| option.is_correct)
            .map(|option| option.id.as_str())
            .collect();
        let selected_set: HashSet<&str> = selected.iter().copied().collect();
        let points_awarded =
            if is_answer_correct(question.kind, &correct, &selected_set) { question.points } else { 0 };

        score += points_awarded;
        graded.push(GradedAnswer {
            question_id: question.id.clone(),
            selected_option_ids: selected.into_iter().map(str::to_string).collect(),
            points_awarded,
        });
    }

    (graded, score)
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptResult {
    pub(crate) attempt: TestAttempt,
    pub(crate) max_score: i64,
    pub(crate) late: bool,
    pub(crate) answers: Vec<GradedAnswer>,
}

#[derive(Debug, Clone)]
pub(crate) enum SubmitOutcome {
    Graded(AttemptResult),
    AlreadyCompleted(AttemptResult),
    NotFound,
}

/// Stored result of a completed attempt.
pub(crate) async fn load_result(
    pool: &PgPool,
    attempt: TestAttempt,
) -> Result<AttemptResult, sqlx::Error> {
    let max_score = repositories::course_tests::max_score(pool, &attempt.test_id).await?;
    let late = attempt.is_late;

    let rows = repositories::attempts::list_answers(pool, &attempt.id).await?;
    let mut selections: HashMap<String, Vec<String>> = HashMap::new();
    for (answer_id, option_id) in
        repositories::attempts::list_selected_options(pool, &attempt.id).await?
    {
        selections.entry(answer_id).or_default().push(option_id);
    }

    let answers = rows
        .into_iter()
        .map(|row| {
            let mut selected_option_ids = selections.remove(&row.id).unwrap_or_default();
            selected_option_ids.sort();
            GradedAnswer {
                question_id: row.question_id,
                selected_option_ids,
                points_awarded: row.points_awarded,
            }
        })
        .collect();

    Ok(AttemptResult { attempt, max_score, late, answers })
}

/// Completes the attempt and records its answers in one transaction.
///
/// A second submit of the same attempt is a no-op that returns the stored result.
pub(crate) async fn submit(
    pool: &PgPool,
    attempt_id: &str,
    student_id: &str,
    submitted: &HashMap<String, Vec<String>>,
) -> Result<SubmitOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let attempt = match repositories::attempts::lock_by_id(&mut *tx, attempt_id).await? {
        Some(attempt) if attempt.student_id == student_id => attempt,
        _ => {
            tx.rollback().await?;
            return Ok(SubmitOutcome::NotFound);
        }
    };
    if attempt.is_completed {
        tx.rollback().await?;
        tracing::info!(attempt_id = %attempt.id, student_id, "Repeated submit ignored");
        return Ok(SubmitOutcome::AlreadyCompleted(load_result(pool, attempt).await?));
    }

    let Some(test) = repositories::course_tests::find_by_id(&mut *tx, &attempt.test_id).await?
    else {
        tx.rollback().await?;
        return Ok(SubmitOutcome::NotFound);
    };

    let ended_at = primitive_now_utc();
    let late = is_late(attempt.started_at, ended_at, test.time_limit_minutes);

    let score = if late {
        0
    } else {
        let questions = repositories::questions::list_by_test(&mut *tx, &test.id).await?;
        let options = repositories::questions::list_options_by_test(&mut *tx, &test.id).await?;
        let (graded, score) = grade(&questions, &options, submitted);

        for answer in &graded {
            let answer_id = Uuid::new_v4().to_string();
            repositories::attempts::insert_answer(
                &mut *tx,
                &answer_id,
                &attempt.id,
                &answer.question_id,
                answer.points_awarded,
                ended_at,
            )
            .await?;
            repositories::attempts::insert_answer_options(
                &mut *tx,
                &answer_id,
                &answer.selected_option_ids,
            )
            .await?;
        }
        score
    };

    repositories::attempts::complete(&mut *tx, &attempt.id, ended_at, score, late).await?;
    tx.commit().await?;

    metrics::record_attempt_graded(late);
    tracing::info!(
        attempt_id = %attempt.id,
        student_id,
        test_id = %test.id,
        score,
        late,
        "Test attempt graded"
    );

    let completed = repositories::attempts::find_by_id(pool, &attempt.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(SubmitOutcome::Graded(load_result(pool, completed).await?))
}
