use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use classpulse_models::StudentSession;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentRow {
    pub session_id: String,
    pub name: String,
    pub channel_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudentRow> for StudentSession {
    fn from(row: StudentRow) -> Self {
        StudentSession {
            session_id: row.session_id,
            name: row.name,
            channel_id: row.channel_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const STUDENT_COLUMNS: &str = "session_id, name, channel_id, is_active, created_at, updated_at";

/// Create the session or, when the session id is already known, refresh the
/// name and reactivate it (re-registration after a reload).
pub async fn upsert_student(
    pool: &DbPool,
    session_id: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<StudentSession, DbError> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "INSERT INTO students (session_id, name, channel_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, NULL, 1, ?3, ?3)
         ON CONFLICT (session_id) DO UPDATE
         SET name = ?2, is_active = 1, updated_at = ?3
         RETURNING {STUDENT_COLUMNS}"
    ))
    .bind(session_id)
    .bind(name)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_student(
    pool: &DbPool,
    session_id: &str,
) -> Result<Option<StudentSession>, DbError> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE session_id = ?1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(StudentSession::from))
}

/// Attach or detach the live channel for a session. A `None` channel marks
/// the session inactive (clean disconnect).
pub async fn set_channel(
    pool: &DbPool,
    session_id: &str,
    channel_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE students
         SET channel_id = ?2, is_active = ?3, updated_at = ?4
         WHERE session_id = ?1",
    )
    .bind(session_id)
    .bind(channel_id)
    .bind(channel_id.is_some())
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Only clear the channel if it is still the one we attached; a reconnect
/// with a fresh channel supersedes the old one and must not be undone by the
/// old connection's teardown.
pub async fn clear_channel_if_current(
    pool: &DbPool,
    session_id: &str,
    channel_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE students
         SET channel_id = NULL, is_active = 0, updated_at = ?3
         WHERE session_id = ?1 AND channel_id = ?2",
    )
    .bind(session_id)
    .bind(channel_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Distinct sessions currently holding a live channel.
pub async fn count_connected(pool: &DbPool) -> Result<i64, DbError> {
    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM students WHERE is_active = 1 AND channel_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(count.0)
}
