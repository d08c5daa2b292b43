use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{LectureStatus, QuestionKind, SubjectStatus, TestStatus, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) group_id: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Group {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Subject {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) status: SubjectStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Lecture {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) title: String,
    pub(crate) status: LectureStatus,
    pub(crate) file_path: Option<String>,
    pub(crate) original_filename: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) file_size: Option<i64>,
    pub(crate) file_sha256: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

impl Lecture {
    pub(crate) fn has_file(&self) -> bool {
        self.file_path.as_deref().is_some_and(|path| !path.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CourseTest {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) status: TestStatus,
    pub(crate) days_to_complete: Option<i32>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AnswerOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TestAttempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) ended_at: Option<PrimitiveDateTime>,
    pub(crate) score: i32,
    pub(crate) is_completed: bool,
    pub(crate) is_late: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) points_awarded: i32,
    pub(crate) created_at: PrimitiveDateTime,
}
