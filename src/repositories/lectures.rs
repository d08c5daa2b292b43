use sqlx::PgPool;

use crate::db::models::Lecture;
use crate::db::types::LectureStatus;

const COLUMNS: &str = "\
    id, subject_id, title, status, file_path, original_filename, content_type, \
    file_size, file_sha256, created_at, updated_at, published_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Lecture>, sqlx::Error> {
    sqlx::query_as::<_, Lecture>(&format!("SELECT {COLUMNS} FROM lectures WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Lecture>, sqlx::Error> {
    sqlx::query_as::<_, Lecture>(&format!(
        "SELECT {COLUMNS} FROM lectures WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_subject(
    pool: &PgPool,
    subject_id: &str,
    published_only: bool,
) -> Result<Vec<Lecture>, sqlx::Error> {
    sqlx::query_as::<_, Lecture>(&format!(
        "SELECT {COLUMNS} FROM lectures \
         WHERE subject_id = $1 AND (NOT $2 OR status = 'published') \
         ORDER BY created_at, title"
    ))
    .bind(subject_id)
    .bind(published_only)
    .fetch_all(pool)
    .await
}

/// A stored object backing a lecture.
pub(crate) struct StoredFile<'a> {
    pub(crate) file_path: &'a str,
    pub(crate) original_filename: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) file_size: i64,
    pub(crate) file_sha256: &'a str,
}

pub(crate) struct CreateLecture<'a> {
    pub(crate) id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) status: LectureStatus,
    pub(crate) file: Option<StoredFile<'a>>,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateLecture<'_>,
) -> Result<Lecture, sqlx::Error> {
    let published_at = (params.status == LectureStatus::Published).then_some(params.now);
    let file = params.file.as_ref();

    sqlx::query_as::<_, Lecture>(&format!(
        "INSERT INTO lectures (
            id, subject_id, title, status, file_path, original_filename, content_type,
            file_size, file_sha256, created_at, updated_at, published_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10,$11)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.subject_id)
    .bind(params.title)
    .bind(params.status)
    .bind(file.map(|f| f.file_path))
    .bind(file.map(|f| f.original_filename))
    .bind(file.map(|f| f.content_type))
    .bind(file.map(|f| f.file_size))
    .bind(file.map(|f| f.file_sha256))
    .bind(params.now)
    .bind(published_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_title(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    title: &str,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE lectures SET title = $1, updated_at = $2 WHERE id = $3")
        .bind(title)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn replace_file(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    file: &StoredFile<'_>,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE lectures SET file_path = $1, original_filename = $2, content_type = $3, \
                file_size = $4, file_sha256 = $5, updated_at = $6 \
         WHERE id = $7",
    )
    .bind(file.file_path)
    .bind(file.original_filename)
    .bind(file.content_type)
    .bind(file.file_size)
    .bind(file.file_sha256)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn set_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: LectureStatus,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE lectures SET status = $1, updated_at = $2, \
                published_at = CASE WHEN $1 = 'published'::lecturestatus \
                                    THEN COALESCE(published_at, $2) ELSE published_at END \
         WHERE id = $3",
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Deletes the row and hands back what it pointed at so the caller can drop the object.
pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Lecture>, sqlx::Error> {
    sqlx::query_as::<_, Lecture>(&format!("DELETE FROM lectures WHERE id = $1 RETURNING {COLUMNS}"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Storage keys of every lecture file in a subject, collected before a cascade delete.
pub(crate) async fn file_paths_for_subject(
    pool: &PgPool,
    subject_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT file_path FROM lectures WHERE subject_id = $1 AND file_path IS NOT NULL",
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await
}
