use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Subject;
use crate::db::types::SubjectStatus;

const COLUMNS: &str = "id, title, description, status, created_at, updated_at, published_at";

/// Structural facts the publishing rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct SubjectContentCounts {
    pub(crate) lectures: i64,
    pub(crate) tests: i64,
    pub(crate) tests_with_questions: i64,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!("SELECT {COLUMNS} FROM subjects WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the subject for the rest of the transaction.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "SELECT {COLUMNS} FROM subjects WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn content_counts(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<SubjectContentCounts, sqlx::Error> {
    sqlx::query_as::<_, SubjectContentCounts>(
        "SELECT \
            (SELECT COUNT(*) FROM lectures WHERE subject_id = $1) AS lectures, \
            (SELECT COUNT(*) FROM tests WHERE subject_id = $1) AS tests, \
            (SELECT COUNT(*) FROM tests t WHERE t.subject_id = $1 \
                AND EXISTS (SELECT 1 FROM questions q WHERE q.test_id = t.id)) AS tests_with_questions",
    )
    .bind(id)
    .fetch_one(executor)
    .await
}

/// Which subjects a listing should include.
#[derive(Debug, Clone)]
pub(crate) enum SubjectScope {
    All,
    TaughtBy(String),
    PublishedForGroup(String),
}

pub(crate) async fn list(
    pool: &PgPool,
    scope: &SubjectScope,
    search: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Subject>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM subjects s WHERE TRUE"));

    match scope {
        SubjectScope::All => {}
        SubjectScope::TaughtBy(teacher_id) => {
            builder.push(
                " AND EXISTS (SELECT 1 FROM subject_teachers st \
                 WHERE st.subject_id = s.id AND st.teacher_id = ",
            );
            builder.push_bind(teacher_id.as_str());
            builder.push(")");
        }
        SubjectScope::PublishedForGroup(group_id) => {
            builder.push(" AND s.status = ");
            builder.push_bind(SubjectStatus::Published);
            builder.push(
                " AND EXISTS (SELECT 1 FROM subject_groups sg \
                 WHERE sg.subject_id = s.id AND sg.group_id = ",
            );
            builder.push_bind(group_id.as_str());
            builder.push(")");
        }
    }

    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        builder.push(" AND (lower(s.title) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR lower(s.description) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    builder.push(" ORDER BY s.title OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Subject>().fetch_all(pool).await
}

pub(crate) struct CreateSubject<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: &'a str,
    pub(crate) now: time::PrimitiveDateTime,
}

/// New subjects always start hidden; publishing goes through the rule engine.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSubject<'_>,
) -> Result<Subject, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "INSERT INTO subjects (id, title, description, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $5) RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(SubjectStatus::Hidden)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_details(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    title: Option<&str>,
    description: Option<&str>,
    now: time::PrimitiveDateTime,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "UPDATE subjects SET title = COALESCE($1, title), \
                description = COALESCE($2, description), updated_at = $3 \
         WHERE id = $4 RETURNING {COLUMNS}"
    ))
    .bind(title)
    .bind(description)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn set_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: SubjectStatus,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE subjects SET status = $1, updated_at = $2, \
                published_at = CASE WHEN $1 = 'published'::subjectstatus \
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

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
