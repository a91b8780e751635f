use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use classpulse_models::{Poll, PollOption, PollStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: String,
    pub question: String,
    pub options: String,
    pub time_limit: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PollRow {
    pub fn into_poll(self) -> Result<Poll, DbError> {
        let options: Vec<PollOption> = serde_json::from_str(&self.options)
            .map_err(|e| DbError::Corrupt(format!("poll {} options: {e}", self.id)))?;
        let status = PollStatus::parse(&self.status)
            .ok_or_else(|| DbError::Corrupt(format!("poll {} status: {}", self.id, self.status)))?;
        Ok(Poll {
            id: self.id,
            question: self.question,
            options,
            time_limit: self.time_limit,
            status,
            started_at: self.started_at,
            created_at: self.created_at,
        })
    }
}

const POLL_COLUMNS: &str = "id, question, options, time_limit, status, started_at, created_at";

pub async fn insert_poll(pool: &DbPool, poll: &Poll) -> Result<(), DbError> {
    let options = serde_json::to_string(&poll.options)
        .map_err(|e| DbError::Corrupt(format!("serialize options: {e}")))?;
    sqlx::query(
        "INSERT INTO polls (id, question, options, time_limit, status, started_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&poll.id)
    .bind(&poll.question)
    .bind(&options)
    .bind(poll.time_limit)
    .bind(poll.status.as_str())
    .bind(poll.started_at)
    .bind(poll.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_poll(pool: &DbPool, poll_id: &str) -> Result<Option<Poll>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1"
    ))
    .bind(poll_id)
    .fetch_optional(pool)
    .await?;
    row.map(PollRow::into_poll).transpose()
}

/// The single poll with stored status 'active', if any. Stored status may be
/// stale; expiry is the caller's concern.
pub async fn get_active_poll(pool: &DbPool) -> Result<Option<Poll>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE status = 'active' LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    row.map(PollRow::into_poll).transpose()
}

/// Completed polls, newest first.
pub async fn get_completed_polls(pool: &DbPool) -> Result<Vec<Poll>, DbError> {
    let rows = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE status = 'completed' ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(PollRow::into_poll).collect()
}

/// Flip a poll to completed. Idempotent by id; returns the poll in its final
/// state, or None when no such poll exists.
pub async fn mark_completed(pool: &DbPool, poll_id: &str) -> Result<Option<Poll>, DbError> {
    sqlx::query("UPDATE polls SET status = 'completed' WHERE id = ?1")
        .bind(poll_id)
        .execute(pool)
        .await?;
    get_poll(pool, poll_id).await
}
