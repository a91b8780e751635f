use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use classpulse_models::Vote;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub id: String,
    pub poll_id: String,
    pub student_id: String,
    pub student_name: String,
    pub option_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            id: row.id,
            poll_id: row.poll_id,
            student_id: row.student_id,
            student_name: row.student_name,
            option_id: row.option_id,
            created_at: row.created_at,
        }
    }
}

const VOTE_COLUMNS: &str = "id, poll_id, student_id, student_name, option_id, created_at";

/// Insert a vote. The unique index on (poll_id, student_id) rejects
/// duplicates under concurrency; callers should check
/// [`DbError::is_unique_violation`] on failure.
pub async fn insert_vote(pool: &DbPool, vote: &Vote) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO votes (id, poll_id, student_id, student_name, option_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&vote.id)
    .bind(&vote.poll_id)
    .bind(&vote.student_id)
    .bind(&vote.student_name)
    .bind(&vote.option_id)
    .bind(vote.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_vote(
    pool: &DbPool,
    poll_id: &str,
    student_id: &str,
) -> Result<Option<Vote>, DbError> {
    let row = sqlx::query_as::<_, VoteRow>(&format!(
        "SELECT {VOTE_COLUMNS} FROM votes WHERE poll_id = ?1 AND student_id = ?2"
    ))
    .bind(poll_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Vote::from))
}

/// All option ids voted on a poll, for tally recomputation.
pub async fn get_poll_option_votes(pool: &DbPool, poll_id: &str) -> Result<Vec<String>, DbError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT option_id FROM votes WHERE poll_id = ?1")
        .bind(poll_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(option_id,)| option_id).collect())
}
