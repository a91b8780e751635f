//! Vote admission and tally recomputation.
//!
//! Student identity arrives already resolved; this module never inspects
//! auth or channel context itself.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use classpulse_db::DbPool;
use classpulse_models::{PollStatus, Vote, VoteTally};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VoteStatus {
    pub has_voted: bool,
    pub selected_option_id: Option<String>,
}

/// Submit a vote. Validation order, failing fast:
/// poll exists, poll active, deadline not passed (the authoritative server
/// clock check; expiry completes the poll as a side effect), option valid,
/// student has not voted.
///
/// The existence pre-check is a latency optimization; the storage unique
/// index on (poll_id, student_id) is what actually defends against
/// concurrent duplicates.
pub async fn submit_vote(
    pool: &DbPool,
    poll_id: &str,
    student_id: &str,
    student_name: &str,
    option_id: &str,
    now: DateTime<Utc>,
) -> Result<(Vote, VoteTally), CoreError> {
    let poll = classpulse_db::polls::get_poll(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if poll.status != PollStatus::Active {
        return Err(CoreError::Expired("This poll has already ended".into()));
    }

    if poll.is_expired(now) {
        classpulse_db::polls::mark_completed(pool, poll_id).await?;
        return Err(CoreError::Expired("Time has expired for this poll".into()));
    }

    if !poll.has_option(option_id) {
        return Err(CoreError::Validation("Invalid option selected".into()));
    }

    if classpulse_db::votes::get_vote(pool, poll_id, student_id)
        .await?
        .is_some()
    {
        return Err(CoreError::Conflict(
            "You have already voted on this poll".into(),
        ));
    }

    let vote = Vote {
        id: Uuid::new_v4().to_string(),
        poll_id: poll_id.to_string(),
        student_id: student_id.to_string(),
        student_name: student_name.trim().to_string(),
        option_id: option_id.to_string(),
        created_at: now,
    };
    if let Err(e) = classpulse_db::votes::insert_vote(pool, &vote).await {
        // Two concurrent submissions can both pass the pre-check; the unique
        // index decides the winner.
        if e.is_unique_violation() {
            return Err(CoreError::Conflict(
                "You have already voted on this poll".into(),
            ));
        }
        return Err(e.into());
    }

    let tally = tally_for_poll(pool, poll_id).await?;
    Ok((vote, tally))
}

/// Whether a student has voted on a poll and, if so, which option. Used for
/// state recovery on reconnect.
pub async fn has_voted(
    pool: &DbPool,
    poll_id: &str,
    student_id: &str,
) -> Result<VoteStatus, CoreError> {
    let vote = classpulse_db::votes::get_vote(pool, poll_id, student_id).await?;
    Ok(match vote {
        Some(v) => VoteStatus {
            has_voted: true,
            selected_option_id: Some(v.option_id),
        },
        None => VoteStatus {
            has_voted: false,
            selected_option_id: None,
        },
    })
}

/// Recompute the full tally for a poll from its vote records.
pub async fn tally_for_poll(pool: &DbPool, poll_id: &str) -> Result<VoteTally, CoreError> {
    let option_ids = classpulse_db::votes::get_poll_option_votes(pool, poll_id).await?;
    Ok(VoteTally::from_option_ids(option_ids))
}
