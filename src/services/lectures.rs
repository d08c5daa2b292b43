use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Lecture;
use crate::db::types::LectureStatus;
use crate::repositories;
use crate::repositories::lectures::{CreateLecture, StoredFile};
use crate::services::publishing::{self, PublishRejection};
use crate::services::storage::StorageService;

#[derive(Debug, Error)]
pub(crate) enum LectureError {
    #[error("lecture not found")]
    NotFound,
    #[error("file storage is not configured")]
    StorageUnavailable,
    #[error("{0}")]
    Rejected(PublishRejection),
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A file taken from a multipart upload, already checked against the size
/// and extension limits.
#[derive(Debug, Clone)]
pub(crate) struct LectureUpload {
    pub(crate) filename: String,
    pub(crate) extension: String,
    pub(crate) bytes: Vec<u8>,
}

pub(crate) fn sanitized_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

/// Lowercased extension without the dot.
pub(crate) fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub(crate) fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

pub(crate) fn object_key(subject_id: &str, extension: &str) -> String {
    format!("lectures/{subject_id}/{}.{extension}", Uuid::new_v4())
}

struct StoredObject {
    key: String,
    original_filename: String,
    content_type: &'static str,
    size: i64,
    sha256: String,
}

impl StoredObject {
    fn as_file(&self) -> StoredFile<'_> {
        StoredFile {
            file_path: &self.key,
            original_filename: &self.original_filename,
            content_type: self.content_type,
            file_size: self.size,
            file_sha256: &self.sha256,
        }
    }
}

async fn store(
    storage: &StorageService,
    subject_id: &str,
    upload: LectureUpload,
) -> Result<StoredObject, LectureError> {
    let key = object_key(subject_id, &upload.extension);
    let content_type = content_type_for(&upload.extension);
    let uploaded = storage
        .upload_bytes(&key, content_type, upload.bytes)
        .await
        .map_err(LectureError::Storage)?;

    tracing::info!(key = %key, size = uploaded.size, "Lecture file stored");

    Ok(StoredObject {
        key,
        original_filename: sanitized_filename(&upload.filename),
        content_type,
        size: uploaded.size,
        sha256: uploaded.sha256,
    })
}

async fn discard(storage: &StorageService, key: &str) {
    if let Err(err) = storage.delete_object(key).await {
        tracing::error!(error = %err, key = %key, "Failed to remove orphaned lecture file");
    }
}

/// The object is written before the row; a failed row write removes it again.
pub(crate) async fn create_lecture(
    pool: &PgPool,
    storage: Option<&StorageService>,
    subject_id: &str,
    title: &str,
    status: LectureStatus,
    upload: Option<LectureUpload>,
) -> Result<Lecture, LectureError> {
    publishing::evaluate_lecture(status, upload.is_some()).map_err(LectureError::Rejected)?;

    let stored = match upload {
        Some(upload) => {
            let storage = storage.ok_or(LectureError::StorageUnavailable)?;
            Some((storage, store(storage, subject_id, upload).await?))
        }
        None => None,
    };

    let lecture_id = Uuid::new_v4().to_string();
    let result = repositories::lectures::create(
        pool,
        CreateLecture {
            id: &lecture_id,
            subject_id,
            title,
            status,
            file: stored.as_ref().map(|(_, object)| object.as_file()),
            now: primitive_now_utc(),
        },
    )
    .await;

    match result {
        Ok(lecture) => {
            tracing::info!(
                lecture_id = %lecture.id,
                subject_id = %subject_id,
                has_file = lecture.has_file(),
                "Lecture created"
            );
            Ok(lecture)
        }
        Err(err) => {
            if let Some((storage, object)) = &stored {
                discard(storage, &object.key).await;
            }
            Err(err.into())
        }
    }
}

/// Attaches a new file; the previous object is removed once the row points
/// at the new one.
pub(crate) async fn replace_file(
    pool: &PgPool,
    storage: Option<&StorageService>,
    lecture_id: &str,
    upload: LectureUpload,
) -> Result<Lecture, LectureError> {
    let storage = storage.ok_or(LectureError::StorageUnavailable)?;
    let lecture = repositories::lectures::find_by_id(pool, lecture_id)
        .await?
        .ok_or(LectureError::NotFound)?;

    let object = store(storage, &lecture.subject_id, upload).await?;

    let previous = match swap_file(pool, lecture_id, &object).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard(storage, &object.key).await;
            return Err(LectureError::NotFound);
        }
        Err(err) => {
            discard(storage, &object.key).await;
            return Err(err.into());
        }
    };

    if let Some(old_key) = previous.file_path.filter(|old| *old != object.key) {
        storage.delete_best_effort(&[old_key]).await;
    }

    tracing::info!(lecture_id = %lecture_id, key = %object.key, "Lecture file replaced");

    repositories::lectures::find_by_id(pool, lecture_id).await?.ok_or(LectureError::NotFound)
}

async fn swap_file(
    pool: &PgPool,
    lecture_id: &str,
    object: &StoredObject,
) -> Result<Option<Lecture>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let Some(previous) = repositories::lectures::lock_by_id(&mut *tx, lecture_id).await? else {
        return Ok(None);
    };
    repositories::lectures::replace_file(&mut *tx, lecture_id, &object.as_file(), primitive_now_utc())
        .await?;
    tx.commit().await?;
    Ok(Some(previous))
}

/// Removes the row under the subject lock, then drops the stored object.
pub(crate) async fn delete_lecture(
    pool: &PgPool,
    storage: Option<&StorageService>,
    lecture_id: &str,
) -> Result<Lecture, LectureError> {
    let lecture = repositories::lectures::find_by_id(pool, lecture_id)
        .await?
        .ok_or(LectureError::NotFound)?;

    let mut tx = pool.begin().await?;
    repositories::subjects::lock_by_id(&mut *tx, &lecture.subject_id).await?;
    let deleted = repositories::lectures::delete(&mut *tx, lecture_id)
        .await?
        .ok_or(LectureError::NotFound)?;
    tx.commit().await?;

    if let (Some(storage), Some(key)) = (storage, deleted.file_path.clone()) {
        storage.delete_best_effort(&[key]).await;
    }

    tracing::info!(lecture_id = %lecture_id, subject_id = %deleted.subject_id, "Lecture deleted");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_filename_keeps_safe_characters() {
        assert_eq!(sanitized_filename("Лекция 1 (intro).pdf"), "1intro.pdf");
        assert_eq!(sanitized_filename("week_02-notes.pptx"), "week_02-notes.pptx");
        assert_eq!(sanitized_filename("???"), "upload");
    }

    #[test]
    fn file_extension_is_lowercased() {
        assert_eq!(file_extension("Notes.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.zip").as_deref(), Some("zip"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".hidden"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn object_keys_are_unique_per_upload() {
        let first = object_key("subj-1", "pdf");
        let second = object_key("subj-1", "pdf");
        assert!(first.starts_with("lectures/subj-1/"));
        assert!(first.ends_with(".pdf"));
        assert_ne!(first, second);
    }

    #[test]
    fn content_types_cover_allowed_extensions() {
        assert_eq!(content_type_for("pdf"), "application/pdf");
        assert_eq!(content_type_for("txt"), "text/plain");
        assert_eq!(content_type_for("exe"), "application/octet-stream");
    }
}
