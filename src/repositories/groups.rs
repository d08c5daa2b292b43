use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::{Group, User};

const COLUMNS: &str = "id, name, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct GroupSummary {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) student_count: i64,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>(&format!("SELECT {COLUMNS} FROM groups WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn name_taken(
    pool: &PgPool,
    name: &str,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM groups WHERE lower(name) = lower($1) AND id IS DISTINCT FROM $2)",
    )
    .bind(name)
    .bind(except_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    search: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<GroupSummary>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT g.id, g.name, g.created_at, \
                (SELECT COUNT(*) FROM users u WHERE u.group_id = g.id) AS student_count \
         FROM groups g",
    );
    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" WHERE lower(g.name) LIKE ");
        builder.push_bind(format!("%{}%", search.to_lowercase()));
    }
    builder.push(" ORDER BY g.name OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<GroupSummary>().fetch_all(pool).await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    now: time::PrimitiveDateTime,
) -> Result<Group, sqlx::Error> {
    sqlx::query_as::<_, Group>(&format!(
        "INSERT INTO groups (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3) \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn rename(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    now: time::PrimitiveDateTime,
) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>(&format!(
        "UPDATE groups SET name = $1, updated_at = $2 WHERE id = $3 RETURNING {COLUMNS}"
    ))
    .bind(name)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM groups WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Replaces the student set of a group. Students listed here leave any previous group.
/// Returns how many students ended up in the group.
pub(crate) async fn replace_members(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    group_id: &str,
    student_ids: &[String],
    now: time::PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    sqlx::query(
        "UPDATE users SET group_id = NULL, updated_at = $1 \
         WHERE group_id = $2 AND NOT (id = ANY($3))",
    )
    .bind(now)
    .bind(group_id)
    .bind(student_ids)
    .execute(&mut **tx)
    .await?;

    let assigned = sqlx::query(
        "UPDATE users SET group_id = $1, updated_at = $2 \
         WHERE id = ANY($3) AND role = 'student'",
    )
    .bind(group_id)
    .bind(now)
    .bind(student_ids)
    .execute(&mut **tx)
    .await?;

    Ok(assigned.rows_affected())
}

pub(crate) async fn list_members(pool: &PgPool, group_id: &str) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, hashed_password, full_name, role, group_id, is_active, created_at, updated_at \
         FROM users WHERE group_id = $1 ORDER BY full_name",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
}
