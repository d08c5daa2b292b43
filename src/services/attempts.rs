use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::core::{metrics, time::primitive_now_utc};
use crate::db::models::{AnswerOption, CourseTest, Question, TestAttempt};
use crate::db::types::QuestionKind;
use crate::repositories;
use crate::services::access::{self, Actor, ContentRef};

pub(crate) const MAX_ATTEMPTS_REACHED: &str = "max attempts reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartDecision {
    Resume,
    Create,
    Blocked,
}

/// An open attempt always wins; the attempt cap only counts completed attempts.
pub(crate) fn decide_start(has_open: bool, completed: i64, max_attempts: Option<i32>) -> StartDecision {
    if has_open {
        return StartDecision::Resume;
    }
    match max_attempts {
        Some(max) if completed >= i64::from(max) => StartDecision::Blocked,
        _ => StartDecision::Create,
    }
}

/// Attempts left before the cap, `None` when unlimited.
pub(crate) fn attempts_left(completed: i64, max_attempts: Option<i32>) -> Option<i64> {
    max_attempts.map(|max| (i64::from(max) - completed).max(0))
}

/// Seconds until the time limit runs out. Grace is not included.
pub(crate) fn remaining_seconds(
    started_at: PrimitiveDateTime,
    time_limit_minutes: Option<i32>,
    now: PrimitiveDateTime,
) -> Option<i64> {
    let limit = time_limit_minutes.filter(|minutes| *minutes > 0)?;
    let deadline = started_at + Duration::minutes(i64::from(limit));
    Some((deadline - now).whole_seconds().max(0))
}

#[derive(Debug, Clone)]
pub(crate) struct StartedAttempt {
    pub(crate) attempt: TestAttempt,
    pub(crate) test: CourseTest,
}

#[derive(Debug, Clone)]
pub(crate) enum StartOutcome {
    Created(StartedAttempt),
    Resumed(StartedAttempt),
    Blocked(&'static str),
    NotFound,
}

impl StartOutcome {
    fn label(&self) -> &'static str {
        match self {
            StartOutcome::Created(_) => "created",
            StartOutcome::Resumed(_) => "resumed",
            StartOutcome::Blocked(_) => "blocked",
            StartOutcome::NotFound => "not_found",
        }
    }
}

/// Returns the student's open attempt, or opens a new one when the cap allows.
///
/// Concurrent calls for the same pair serialize on an advisory lock; the
/// partial unique index on open attempts backs that up, and a lost insert
/// re-reads the winner's attempt.
pub(crate) async fn start_or_resume(
    pool: &PgPool,
    actor: &Actor,
    test_id: &str,
) -> Result<StartOutcome, sqlx::Error> {
    let Some(test) = repositories::course_tests::find_by_id(pool, test_id).await? else {
        return Ok(StartOutcome::NotFound);
    };
    let Some(subject) = repositories::subjects::find_by_id(pool, &test.subject_id).await? else {
        return Ok(StartOutcome::NotFound);
    };
    if !access::can_view(pool, actor, ContentRef::test(&subject, test.status)).await? {
        return Ok(StartOutcome::NotFound);
    }

    let mut tx = pool.begin().await?;
    repositories::attempts::acquire_pair_lock(&mut *tx, &test.id, &actor.id).await?;

    let open = repositories::attempts::find_open(&mut *tx, &test.id, &actor.id).await?;
    let completed = if open.is_some() {
        0
    } else {
        repositories::attempts::count_completed(&mut *tx, &test.id, &actor.id).await?
    };

    let outcome = match (decide_start(open.is_some(), completed, test.max_attempts), open) {
        (StartDecision::Resume, Some(attempt)) => {
            StartOutcome::Resumed(StartedAttempt { attempt, test })
        }
        (StartDecision::Blocked, _) => StartOutcome::Blocked(MAX_ATTEMPTS_REACHED),
        _ => {
            let attempt_id = Uuid::new_v4().to_string();
            let inserted = repositories::attempts::create(
                &mut *tx,
                repositories::attempts::CreateAttempt {
                    id: &attempt_id,
                    test_id: &test.id,
                    student_id: &actor.id,
                    started_at: primitive_now_utc(),
                },
            )
            .await?;

            if inserted {
                let attempt = repositories::attempts::find_by_id(&mut *tx, &attempt_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                StartOutcome::Created(StartedAttempt { attempt, test })
            } else {
                let attempt = repositories::attempts::find_open(&mut *tx, &test.id, &actor.id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                StartOutcome::Resumed(StartedAttempt { attempt, test })
            }
        }
    };

    tx.commit().await?;

    metrics::record_attempt_start(outcome.label());
    match &outcome {
        StartOutcome::Created(started) | StartOutcome::Resumed(started) => {
            tracing::info!(
                student_id = %actor.id,
                test_id = %started.test.id,
                attempt_id = %started.attempt.id,
                outcome = outcome.label(),
                "Test attempt opened"
            );
        }
        StartOutcome::Blocked(reason) => {
            tracing::info!(
                student_id = %actor.id,
                test_id = %test_id,
                completed,
                reason = *reason,
                "Test attempt blocked"
            );
        }
        StartOutcome::NotFound => {}
    }

    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PresentedOption {
    pub(crate) id: String,
    pub(crate) text: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PresentedQuestion {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    pub(crate) points: i32,
    pub(crate) options: Vec<PresentedOption>,
}

/// Questions keep their stored order; options are shuffled on every call and
/// never carry correctness.
pub(crate) fn present_questions<R: Rng + ?Sized>(
    questions: &[Question],
    options: &[AnswerOption],
    rng: &mut R,
) -> Vec<PresentedQuestion> {
    let mut by_question: HashMap<&str, Vec<PresentedOption>> = HashMap::new();
    for option in options {
        by_question
            .entry(option.question_id.as_str())
            .or_default()
            .push(PresentedOption { id: option.id.clone(), text: option.text.clone() });
    }

    questions
        .iter()
        .map(|question| {
            let mut options = by_question.remove(question.id.as_str()).unwrap_or_default();
            options.shuffle(rng);
            PresentedQuestion {
                id: question.id.clone(),
                text: question.text.clone(),
                kind: question.kind,
                points: question.points,
                options,
            }
        })
        .collect()
}

pub(crate) async fn load_presentation(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<PresentedQuestion>, sqlx::Error> {
    let questions = repositories::questions::list_by_test(pool, test_id).await?;
    let options = repositories::questions::list_options_by_test(pool, test_id).await?;
    Ok(present_questions(&questions, &options, &mut rand::thread_rng()))
}
