use sqlx::PgPool;

use crate::db::models::{StudentAnswer, TestAttempt};

const COLUMNS: &str =
    "id, test_id, student_id, started_at, ended_at, score, is_completed, is_late";

/// Serializes start requests for one (student, test) pair until the transaction ends.
pub(crate) async fn acquire_pair_lock(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("test_attempt:{test_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_open(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: &str,
    student_id: &str,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts \
         WHERE test_id = $1 AND student_id = $2 AND NOT is_completed"
    ))
    .bind(test_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_completed(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM test_attempts WHERE test_id = $1 AND student_id = $2 AND is_completed",
    )
    .bind(test_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) started_at: time::PrimitiveDateTime,
}

/// Returns false when another open attempt for the pair already exists.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO test_attempts (id, test_id, student_id, started_at, score, is_completed) \
         VALUES ($1, $2, $3, $4, 0, FALSE) \
         ON CONFLICT DO NOTHING",
    )
    .bind(params.id)
    .bind(params.test_id)
    .bind(params.student_id)
    .bind(params.started_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!("SELECT {COLUMNS} FROM test_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn complete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    ended_at: time::PrimitiveDateTime,
    score: i32,
    is_late: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE test_attempts SET ended_at = $1, score = $2, is_late = $3, is_completed = TRUE \
         WHERE id = $4 AND NOT is_completed",
    )
    .bind(ended_at)
    .bind(score)
    .bind(is_late)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn insert_answer(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    attempt_id: &str,
    question_id: &str,
    points_awarded: i32,
    created_at: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_answers (id, attempt_id, question_id, points_awarded, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(attempt_id)
    .bind(question_id)
    .bind(points_awarded)
    .bind(created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn insert_answer_options(
    executor: impl sqlx::PgExecutor<'_>,
    answer_id: &str,
    option_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_answer_options (answer_id, option_id) \
         SELECT $1, UNNEST($2::VARCHAR[]) ON CONFLICT DO NOTHING",
    )
    .bind(answer_id)
    .bind(option_ids)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_answers(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<StudentAnswer>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswer>(
        "SELECT id, attempt_id, question_id, points_awarded, created_at \
         FROM student_answers WHERE attempt_id = $1 ORDER BY created_at, question_id",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

/// (answer id, option id) pairs for every answer of the attempt.
pub(crate) async fn list_selected_options(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String)>(
        "SELECT sao.answer_id, sao.option_id \
         FROM student_answer_options sao JOIN student_answers sa ON sa.id = sao.answer_id \
         WHERE sa.attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    test_id: &str,
    student_id: &str,
) -> Result<Vec<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts WHERE test_id = $1 AND student_id = $2 \
         ORDER BY started_at DESC"
    ))
    .bind(test_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StudentResultRow {
    pub(crate) student_id: String,
    pub(crate) full_name: String,
    pub(crate) email: String,
    pub(crate) group_name: Option<String>,
    pub(crate) attempts: i64,
    pub(crate) best_score: Option<i32>,
    pub(crate) last_attempt_at: Option<time::PrimitiveDateTime>,
}

/// One row per student with at least one completed attempt.
pub(crate) async fn results_for_test(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<StudentResultRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentResultRow>(
        "SELECT u.id AS student_id, u.full_name, u.email, g.name AS group_name, \
                COUNT(a.id) AS attempts, MAX(a.score) AS best_score, \
                MAX(a.ended_at) AS last_attempt_at \
         FROM test_attempts a \
         JOIN users u ON u.id = a.student_id \
         LEFT JOIN groups g ON g.id = u.group_id \
         WHERE a.test_id = $1 AND a.is_completed \
         GROUP BY u.id, u.full_name, u.email, g.name \
         ORDER BY u.full_name",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}
