use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "subjectstatus", rename_all = "lowercase")]
pub(crate) enum SubjectStatus {
    Hidden,
    Draft,
    Published,
}

/// Lectures have no draft stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "lecturestatus", rename_all = "lowercase")]
pub(crate) enum LectureStatus {
    Hidden,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "teststatus", rename_all = "lowercase")]
pub(crate) enum TestStatus {
    Hidden,
    Draft,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questionkind", rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    Single,
    Multiple,
}

impl SubjectStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubjectStatus::Hidden => "hidden",
            SubjectStatus::Draft => "draft",
            SubjectStatus::Published => "published",
        }
    }
}

impl LectureStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            LectureStatus::Hidden => "hidden",
            LectureStatus::Published => "published",
        }
    }
}

impl TestStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TestStatus::Hidden => "hidden",
            TestStatus::Draft => "draft",
            TestStatus::Published => "published",
        }
    }
}
