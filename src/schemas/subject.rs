use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Subject;
use crate::db::types::SubjectStatus;
use crate::schemas::course_test::CourseTestResponse;
use crate::schemas::lecture::LectureResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectCreate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    #[serde(alias = "teacherIds")]
    pub(crate) teacher_ids: Vec<String>,
}

/// Omitted fields are left unchanged; `teacher_ids` replaces the whole teacher set.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    #[serde(alias = "teacherIds")]
    pub(crate) teacher_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubjectGroupsUpdate {
    #[serde(alias = "groupIds")]
    pub(crate) group_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubjectListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) status: SubjectStatus,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
}

impl SubjectResponse {
    pub(crate) fn from_db(subject: Subject) -> Self {
        Self {
            id: subject.id,
            title: subject.title,
            description: subject.description,
            status: subject.status,
            created_at: format_primitive(subject.created_at),
            updated_at: format_primitive(subject.updated_at),
            published_at: format_optional(subject.published_at),
        }
    }
}

/// Teacher and group ids are only filled in for callers who manage the subject.
#[derive(Debug, Serialize)]
pub(crate) struct SubjectDetailResponse {
    #[serde(flatten)]
    pub(crate) subject: SubjectResponse,
    pub(crate) can_manage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) teacher_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) group_ids: Option<Vec<String>>,
    pub(crate) lectures: Vec<LectureResponse>,
    pub(crate) tests: Vec<CourseTestResponse>,
}
