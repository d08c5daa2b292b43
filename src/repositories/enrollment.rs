//! Teacher authorship and group enrollment for subjects.

use sqlx::Postgres;

pub(crate) async fn is_subject_teacher(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
    teacher_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM subject_teachers WHERE subject_id = $1 AND teacher_id = $2)",
    )
    .bind(subject_id)
    .bind(teacher_id)
    .fetch_one(executor)
    .await
}

/// True when the student's group is enrolled in the subject.
pub(crate) async fn is_student_enrolled(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(\
            SELECT 1 FROM subject_groups sg JOIN users u ON u.group_id = sg.group_id \
            WHERE sg.subject_id = $1 AND u.id = $2)",
    )
    .bind(subject_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn teacher_ids(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT teacher_id FROM subject_teachers WHERE subject_id = $1 ORDER BY teacher_id",
    )
    .bind(subject_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn group_ids(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT group_id FROM subject_groups WHERE subject_id = $1 ORDER BY group_id",
    )
    .bind(subject_id)
    .fetch_all(executor)
    .await
}

/// Clears and rebuilds the teacher set. Ids that are not teachers are skipped.
pub(crate) async fn replace_teachers(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    subject_id: &str,
    teacher_ids: &[String],
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM subject_teachers WHERE subject_id = $1")
        .bind(subject_id)
        .execute(&mut **tx)
        .await?;

    let inserted = sqlx::query(
        "INSERT INTO subject_teachers (subject_id, teacher_id) \
         SELECT $1, u.id FROM users u WHERE u.id = ANY($2) AND u.role = 'teacher' \
         ON CONFLICT DO NOTHING",
    )
    .bind(subject_id)
    .bind(teacher_ids)
    .execute(&mut **tx)
    .await?;

    Ok(inserted.rows_affected())
}

/// Clears and rebuilds the enrolled group set. Unknown group ids are skipped.
pub(crate) async fn replace_groups(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    subject_id: &str,
    group_ids: &[String],
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM subject_groups WHERE subject_id = $1")
        .bind(subject_id)
        .execute(&mut **tx)
        .await?;

    let inserted = sqlx::query(
        "INSERT INTO subject_groups (subject_id, group_id) \
         SELECT $1, g.id FROM groups g WHERE g.id = ANY($2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(subject_id)
    .bind(group_ids)
    .execute(&mut **tx)
    .await?;

    Ok(inserted.rows_affected())
}
