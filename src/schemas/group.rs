use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::format_primitive;
use crate::repositories::groups::GroupSummary;
use crate::schemas::user::UserResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupCreate {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    #[serde(alias = "studentIds")]
    pub(crate) student_ids: Vec<String>,
}

/// Omitted fields are left unchanged; `student_ids` replaces the whole member set.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    #[serde(alias = "studentIds")]
    pub(crate) student_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) student_count: i64,
    pub(crate) created_at: String,
}

impl GroupResponse {
    pub(crate) fn from_summary(summary: GroupSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            student_count: summary.student_count,
            created_at: format_primitive(summary.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupDetailResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_at: String,
    pub(crate) students: Vec<UserResponse>,
}
