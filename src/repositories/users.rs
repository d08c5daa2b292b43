use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::User;
use crate::db::types::UserRole;

const COLUMNS: &str =
    "id, email, hashed_password, full_name, role, group_id, is_active, created_at, updated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE lower(email) = lower($1)"))
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn exists_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateUser<'a> {
    pub(crate) id: &'a str,
    pub(crate) email: &'a str,
    pub(crate) hashed_password: String,
    pub(crate) full_name: &'a str,
    pub(crate) role: UserRole,
    pub(crate) group_id: Option<&'a str>,
    pub(crate) is_active: bool,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateUser<'_>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (
            id, email, hashed_password, full_name, role, group_id, is_active, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.email)
    .bind(params.hashed_password)
    .bind(params.full_name)
    .bind(params.role)
    .bind(params.group_id)
    .bind(params.is_active)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct UpdateUser {
    pub(crate) full_name: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) role: Option<UserRole>,
    pub(crate) is_active: Option<bool>,
    pub(crate) hashed_password: Option<String>,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

/// Users leaving the student role also leave their group.
pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: UpdateUser,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET
            full_name = COALESCE($1, full_name),
            email = COALESCE($2, email),
            role = COALESCE($3, role),
            is_active = COALESCE($4, is_active),
            hashed_password = COALESCE($5, hashed_password),
            group_id = CASE WHEN COALESCE($3, role) = 'student' THEN group_id ELSE NULL END,
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(params.full_name)
    .bind(params.email)
    .bind(params.role)
    .bind(params.is_active)
    .bind(params.hashed_password)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Moves a student into `group_id`, or out of any group when `None`.
pub(crate) async fn set_group(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    group_id: Option<&str>,
    updated_at: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET group_id = $1, updated_at = $2 WHERE id = $3 AND role = 'student'",
    )
    .bind(group_id)
    .bind(updated_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Default)]
pub(crate) struct UserFilter {
    pub(crate) role: Option<UserRole>,
    pub(crate) group_id: Option<String>,
    pub(crate) search: Option<String>,
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a UserFilter) {
    builder.push(" WHERE TRUE");
    if let Some(role) = filter.role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }
    if let Some(group_id) = filter.group_id.as_deref() {
        builder.push(" AND group_id = ");
        builder.push_bind(group_id);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        builder.push(" AND (lower(full_name) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR lower(email) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &UserFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<User>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM users"));
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY full_name, created_at OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<User>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &UserFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_filter(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Ids from `ids` that belong to users holding `role`.
pub(crate) async fn filter_ids_with_role(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
    role: UserRole,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE id = ANY($1) AND role = $2")
        .bind(ids)
        .bind(role)
        .fetch_all(executor)
        .await
}
