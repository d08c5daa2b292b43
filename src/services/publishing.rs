use std::fmt;

use serde::Serialize;
use sqlx::PgPool;

use crate::core::{metrics, time::primitive_now_utc};
use crate::db::types::{LectureStatus, SubjectStatus, TestStatus};
use crate::repositories;
use crate::repositories::subjects::SubjectContentCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum UnmetCondition {
    LectureHasNoFile,
    TestHasNoQuestions,
    SubjectHasNoLectures,
    SubjectHasNoTests,
    SubjectTestsHaveNoQuestions,
}

impl UnmetCondition {
    pub(crate) fn message(self) -> &'static str {
        match self {
            UnmetCondition::LectureHasNoFile => "lecture has no attached file",
            UnmetCondition::TestHasNoQuestions => "test has no questions",
            UnmetCondition::SubjectHasNoLectures => "subject has no lectures",
            UnmetCondition::SubjectHasNoTests => "subject has no tests",
            UnmetCondition::SubjectTestsHaveNoQuestions => {
                "none of the subject's tests has a question"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishRejection {
    pub(crate) unmet: Vec<UnmetCondition>,
}

impl PublishRejection {
    pub(crate) fn reason(&self) -> String {
        let parts: Vec<&str> = self.unmet.iter().map(|condition| condition.message()).collect();
        format!("cannot publish: {}", parts.join("; "))
    }
}

impl fmt::Display for PublishRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

fn conclude(unmet: Vec<UnmetCondition>) -> Result<(), PublishRejection> {
    if unmet.is_empty() {
        Ok(())
    } else {
        Err(PublishRejection { unmet })
    }
}

pub(crate) fn evaluate_lecture(target: LectureStatus, has_file: bool) -> Result<(), PublishRejection> {
    match target {
        LectureStatus::Published if !has_file => conclude(vec![UnmetCondition::LectureHasNoFile]),
        _ => Ok(()),
    }
}

pub(crate) fn evaluate_test(target: TestStatus, question_count: i64) -> Result<(), PublishRejection> {
    match target {
        TestStatus::Published if question_count == 0 => {
            conclude(vec![UnmetCondition::TestHasNoQuestions])
        }
        _ => Ok(()),
    }
}

pub(crate) fn evaluate_subject(
    target: SubjectStatus,
    counts: SubjectContentCounts,
) -> Result<(), PublishRejection> {
    if target != SubjectStatus::Published {
        return Ok(());
    }

    let mut unmet = Vec::new();
    if counts.lectures == 0 {
        unmet.push(UnmetCondition::SubjectHasNoLectures);
    }
    if counts.tests == 0 {
        unmet.push(UnmetCondition::SubjectHasNoTests);
    } else if counts.tests_with_questions == 0 {
        unmet.push(UnmetCondition::SubjectTestsHaveNoQuestions);
    }
    conclude(unmet)
}

#[derive(Debug, Clone)]
pub(crate) enum StatusChange {
    Subject { id: String, status: SubjectStatus },
    Lecture { id: String, status: LectureStatus },
    Test { id: String, status: TestStatus },
}

impl StatusChange {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            StatusChange::Subject { .. } => "subject",
            StatusChange::Lecture { .. } => "lecture",
            StatusChange::Test { .. } => "test",
        }
    }

    pub(crate) fn id(&self) -> &str {
        match self {
            StatusChange::Subject { id, .. }
            | StatusChange::Lecture { id, .. }
            | StatusChange::Test { id, .. } => id,
        }
    }

    pub(crate) fn status_label(&self) -> &'static str {
        match self {
            StatusChange::Subject { status, .. } => status.as_str(),
            StatusChange::Lecture { status, .. } => status.as_str(),
            StatusChange::Test { status, .. } => status.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatusChangeOutcome {
    Accepted,
    Rejected(PublishRejection),
    NotFound,
}

/// Locks the target row, evaluates the rules against the locked state and
/// writes the new status only when accepted. Moving away from `Published`
/// is always allowed and never cascades to parents or children.
pub(crate) async fn request_status_change(
    pool: &PgPool,
    change: &StatusChange,
) -> Result<StatusChangeOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = primitive_now_utc();

    let verdict = match change {
        StatusChange::Subject { id, status } => {
            if repositories::subjects::lock_by_id(&mut *tx, id).await?.is_none() {
                return Ok(StatusChangeOutcome::NotFound);
            }
            let counts = repositories::subjects::content_counts(&mut *tx, id).await?;
            let verdict = evaluate_subject(*status, counts);
            if verdict.is_ok() {
                repositories::subjects::set_status(&mut *tx, id, *status, now).await?;
            }
            verdict
        }
        StatusChange::Lecture { id, status } => {
            let Some(lecture) = repositories::lectures::lock_by_id(&mut *tx, id).await? else {
                return Ok(StatusChangeOutcome::NotFound);
            };
            let verdict = evaluate_lecture(*status, lecture.has_file());
            if verdict.is_ok() {
                repositories::lectures::set_status(&mut *tx, id, *status, now).await?;
            }
            verdict
        }
        StatusChange::Test { id, status } => {
            if repositories::course_tests::lock_by_id(&mut *tx, id).await?.is_none() {
                return Ok(StatusChangeOutcome::NotFound);
            }
            let questions = repositories::course_tests::count_questions(&mut *tx, id).await?;
            let verdict = evaluate_test(*status, questions);
            if verdict.is_ok() {
                repositories::course_tests::set_status(&mut *tx, id, *status, now).await?;
            }
            verdict
        }
    };

    metrics::record_status_change(change.kind(), verdict.is_ok());

    match verdict {
        Ok(()) => {
            tx.commit().await?;
            tracing::info!(
                kind = change.kind(),
                id = %change.id(),
                status = change.status_label(),
                "Status change accepted"
            );
            Ok(StatusChangeOutcome::Accepted)
        }
        Err(rejection) => {
            tx.rollback().await?;
            tracing::info!(
                kind = change.kind(),
                id = %change.id(),
                status = change.status_label(),
                reason = %rejection,
                "Status change rejected"
            );
            Ok(StatusChangeOutcome::Rejected(rejection))
        }
    }
}
