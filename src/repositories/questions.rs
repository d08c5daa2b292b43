use sqlx::Postgres;

use crate::db::models::{AnswerOption, Question};
use crate::db::types::QuestionKind;

const COLUMNS: &str = "id, test_id, text, kind, points, order_index, created_at, updated_at";
const OPTION_COLUMNS: &str = "id, question_id, text, is_correct, order_index";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_by_test(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE test_id = $1 ORDER BY order_index, created_at"
    ))
    .bind(test_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_options_by_test(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: &str,
) -> Result<Vec<AnswerOption>, sqlx::Error> {
    sqlx::query_as::<_, AnswerOption>(
        "SELECT o.id, o.question_id, o.text, o.is_correct, o.order_index \
         FROM answer_options o JOIN questions q ON q.id = o.question_id \
         WHERE q.test_id = $1 ORDER BY o.question_id, o.order_index",
    )
    .bind(test_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_options(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
) -> Result<Vec<AnswerOption>, sqlx::Error> {
    sqlx::query_as::<_, AnswerOption>(&format!(
        "SELECT {OPTION_COLUMNS} FROM answer_options WHERE question_id = $1 ORDER BY order_index"
    ))
    .bind(question_id)
    .fetch_all(executor)
    .await
}

pub(crate) struct NewOption<'a> {
    pub(crate) text: &'a str,
    pub(crate) is_correct: bool,
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) kind: QuestionKind,
    pub(crate) points: i32,
    pub(crate) now: time::PrimitiveDateTime,
}

/// Appends a question at the end of the test with its options.
pub(crate) async fn create(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    params: CreateQuestion<'_>,
    options: &[NewOption<'_>],
) -> Result<Question, sqlx::Error> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (id, test_id, text, kind, points, order_index, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, \
                 (SELECT COALESCE(MAX(order_index) + 1, 0) FROM questions WHERE test_id = $2), \
                 $6, $6) \
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.test_id)
    .bind(params.text)
    .bind(params.kind)
    .bind(params.points)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await?;

    insert_options(tx, &question.id, options).await?;
    Ok(question)
}

pub(crate) async fn update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: &str,
    text: &str,
    kind: QuestionKind,
    points: i32,
    options: &[NewOption<'_>],
    now: time::PrimitiveDateTime,
) -> Result<Option<Question>, sqlx::Error> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "UPDATE questions SET text = $1, kind = $2, points = $3, updated_at = $4 \
         WHERE id = $5 RETURNING {COLUMNS}"
    ))
    .bind(text)
    .bind(kind)
    .bind(points)
    .bind(now)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    if question.is_none() {
        return Ok(None);
    }

    sqlx::query("DELETE FROM answer_options WHERE question_id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    insert_options(tx, id, options).await?;

    Ok(question)
}

/// Option order follows the slice order.
async fn insert_options(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    question_id: &str,
    options: &[NewOption<'_>],
) -> Result<(), sqlx::Error> {
    for (index, option) in options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO answer_options (id, question_id, text, is_correct, order_index) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(question_id)
        .bind(option.text)
        .bind(option.is_correct)
        .bind(index as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub(crate) async fn delete(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: &str,
    test_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1 AND test_id = $2")
        .bind(id)
        .bind(test_id)
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE questions q SET order_index = ranked.position \
         FROM (SELECT id, (ROW_NUMBER() OVER (ORDER BY order_index, created_at) - 1)::INT AS position \
               FROM questions WHERE test_id = $1) ranked \
         WHERE q.id = ranked.id",
    )
    .bind(test_id)
    .execute(&mut **tx)
    .await?;

    Ok(true)
}
