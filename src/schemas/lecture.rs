use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Lecture;
use crate::db::types::LectureStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LectureUpdate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LectureResponse {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) title: String,
    pub(crate) status: LectureStatus,
    pub(crate) has_file: bool,
    pub(crate) original_filename: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) file_size: Option<i64>,
    pub(crate) file_sha256: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
}

impl LectureResponse {
    pub(crate) fn from_db(lecture: Lecture) -> Self {
        Self {
            has_file: lecture.has_file(),
            id: lecture.id,
            subject_id: lecture.subject_id,
            title: lecture.title,
            status: lecture.status,
            original_filename: lecture.original_filename,
            content_type: lecture.content_type,
            file_size: lecture.file_size,
            file_sha256: lecture.file_sha256,
            created_at: format_primitive(lecture.created_at),
            updated_at: format_primitive(lecture.updated_at),
            published_at: format_optional(lecture.published_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LectureDownloadResponse {
    pub(crate) url: String,
    pub(crate) filename: Option<String>,
    pub(crate) expires_in_seconds: u64,
}
