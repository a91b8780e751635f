//! Poll lifecycle: creation, the single-active-poll invariant, and status
//! transitions. All status flips funnel through this module; no other
//! component writes poll state directly.

use crate::error::CoreError;
use crate::ledger;
use chrono::{DateTime, Utc};
use classpulse_db::DbPool;
use classpulse_models::poll::{
    DEFAULT_TIME_LIMIT_SECS, MAX_OPTIONS, MAX_TIME_LIMIT_SECS, MIN_OPTIONS, MIN_QUESTION_LEN,
    MIN_TIME_LIMIT_SECS,
};
use classpulse_models::{Poll, PollOption, PollStatus, VoteTally};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ActivePollState {
    pub poll: Poll,
    pub remaining_secs: i64,
    pub tally: VoteTally,
}

#[derive(Debug, Clone)]
pub struct PollWithTally {
    pub poll: Poll,
    pub tally: VoteTally,
}

/// Create and activate a new poll.
///
/// Rejects with `Conflict` while another poll is still inside its time
/// window. An "active" poll whose deadline silently passed (e.g. the timer
/// never fired) is transitioned to completed first, then creation proceeds.
pub async fn create_poll(
    pool: &DbPool,
    question: &str,
    options: &[String],
    time_limit: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Poll, CoreError> {
    let question = question.trim();
    if question.len() < MIN_QUESTION_LEN {
        return Err(CoreError::Validation(
            "Question must be at least 3 characters".into(),
        ));
    }

    let texts: Vec<&str> = options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect();
    if texts.len() < MIN_OPTIONS {
        return Err(CoreError::Validation(
            "A poll must have at least 2 options".into(),
        ));
    }
    if texts.len() > MAX_OPTIONS {
        return Err(CoreError::Validation(
            "A poll cannot have more than 6 options".into(),
        ));
    }

    let time_limit = time_limit.unwrap_or(DEFAULT_TIME_LIMIT_SECS);
    if !(MIN_TIME_LIMIT_SECS..=MAX_TIME_LIMIT_SECS).contains(&time_limit) {
        return Err(CoreError::Validation(
            "Time limit must be between 10 and 120 seconds".into(),
        ));
    }

    if let Some(active) = classpulse_db::polls::get_active_poll(pool).await? {
        if active.is_expired(now) {
            // The timer failed to fire; heal the stored state and move on.
            classpulse_db::polls::mark_completed(pool, &active.id).await?;
            tracing::info!(poll_id = %active.id, "lazy-expired stale active poll on create");
        } else {
            return Err(CoreError::Conflict(
                "Cannot create a new poll while one is still active".into(),
            ));
        }
    }

    let poll = Poll {
        id: Uuid::new_v4().to_string(),
        question: question.to_string(),
        options: texts
            .into_iter()
            .map(|text| PollOption {
                id: Uuid::new_v4().to_string(),
                text: text.to_string(),
            })
            .collect(),
        time_limit,
        status: PollStatus::Active,
        started_at: now,
        created_at: now,
    };
    classpulse_db::polls::insert_poll(pool, &poll).await?;
    Ok(poll)
}

/// The current active poll with remaining time and tally, or `None`.
///
/// Expiry is also checked here, lazily: a poll past its deadline is
/// transitioned to completed as a side effect and `None` is returned. The
/// timer only needs to be reliable for responsiveness, not correctness.
pub async fn get_active_poll(
    pool: &DbPool,
    now: DateTime<Utc>,
) -> Result<Option<ActivePollState>, CoreError> {
    let Some(poll) = classpulse_db::polls::get_active_poll(pool).await? else {
        return Ok(None);
    };

    if poll.is_expired(now) {
        classpulse_db::polls::mark_completed(pool, &poll.id).await?;
        tracing::info!(poll_id = %poll.id, "lazy-expired stale active poll on read");
        return Ok(None);
    }

    let remaining_secs = poll.remaining_secs(now);
    let tally = ledger::tally_for_poll(pool, &poll.id).await?;
    Ok(Some(ActivePollState {
        poll,
        remaining_secs,
        tally,
    }))
}

/// Idempotent-by-id transition to completed. Used by the timer callback and
/// the lazy-expiry paths.
pub async fn complete_poll(pool: &DbPool, poll_id: &str) -> Result<Poll, CoreError> {
    classpulse_db::polls::mark_completed(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)
}

pub async fn get_poll(pool: &DbPool, poll_id: &str) -> Result<PollWithTally, CoreError> {
    let poll = classpulse_db::polls::get_poll(pool, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let tally = ledger::tally_for_poll(pool, &poll.id).await?;
    Ok(PollWithTally { poll, tally })
}

/// Completed polls with their tallies, newest first.
pub async fn get_history(pool: &DbPool) -> Result<Vec<PollWithTally>, CoreError> {
    let polls = classpulse_db::polls::get_completed_polls(pool).await?;
    let mut history = Vec::with_capacity(polls.len());
    for poll in polls {
        let tally = ledger::tally_for_poll(pool, &poll.id).await?;
        history.push(PollWithTally { poll, tally });
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;
    use chrono::Duration;

    fn two_options() -> Vec<String> {
        vec!["Red".into(), "Blue".into()]
    }

    #[tokio::test]
    async fn create_rejects_malformed_input() {
        let db = setup_db("lifecycle-validate").await;
        let now = Utc::now();

        let err = create_poll(&db, "ab", &two_options(), Some(30), now)
            .await
            .expect_err("short question");
        assert!(matches!(err, CoreError::Validation(_)));

        let err = create_poll(&db, "Pick one?", &["Red".into(), "  ".into()], Some(30), now)
            .await
            .expect_err("one non-empty option");
        assert!(matches!(err, CoreError::Validation(_)));

        let err = create_poll(&db, "Pick one?", &two_options(), Some(5), now)
            .await
            .expect_err("time limit too low");
        assert!(matches!(err, CoreError::Validation(_)));

        let err = create_poll(&db, "Pick one?", &two_options(), Some(121), now)
            .await
            .expect_err("time limit too high");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn create_assigns_fresh_option_ids_and_defaults() {
        let db = setup_db("lifecycle-create").await;
        let poll = create_poll(&db, "  Pick a color?  ", &two_options(), None, Utc::now())
            .await
            .expect("create");

        assert_eq!(poll.question, "Pick a color?");
        assert_eq!(poll.time_limit, 60);
        assert_eq!(poll.status, PollStatus::Active);
        assert_eq!(poll.options.len(), 2);
        assert_ne!(poll.options[0].id, poll.options[1].id);
    }

    #[tokio::test]
    async fn create_conflicts_while_a_poll_is_inside_its_window() {
        let db = setup_db("lifecycle-conflict").await;
        let now = Utc::now();
        create_poll(&db, "First?", &two_options(), Some(60), now - Duration::seconds(5))
            .await
            .expect("first poll");

        let err = create_poll(&db, "Second?", &two_options(), Some(60), now)
            .await
            .expect_err("still active");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_heals_a_silently_expired_active_poll() {
        let db = setup_db("lifecycle-heal").await;
        let now = Utc::now();
        let stale = create_poll(
            &db,
            "First?",
            &two_options(),
            Some(60),
            now - Duration::seconds(70),
        )
        .await
        .expect("stale poll");

        let fresh = create_poll(&db, "Second?", &two_options(), Some(60), now)
            .await
            .expect("creation proceeds after healing");
        assert_eq!(fresh.status, PollStatus::Active);

        let healed = classpulse_db::polls::get_poll(&db, &stale.id)
            .await
            .expect("get")
            .expect("some");
        assert_eq!(healed.status, PollStatus::Completed);
    }

    #[tokio::test]
    async fn get_active_lazily_expires_and_returns_none() {
        let db = setup_db("lifecycle-lazy").await;
        let now = Utc::now();
        let poll = create_poll(
            &db,
            "Old one?",
            &two_options(),
            Some(30),
            now - Duration::seconds(31),
        )
        .await
        .expect("create");

        assert!(get_active_poll(&db, now).await.expect("read").is_none());
        let stored = classpulse_db::polls::get_poll(&db, &poll.id)
            .await
            .expect("get")
            .expect("some");
        assert_eq!(stored.status, PollStatus::Completed);
    }

    #[tokio::test]
    async fn get_active_reports_remaining_and_tally() {
        let db = setup_db("lifecycle-active").await;
        let now = Utc::now();
        let poll = create_poll(&db, "Now?", &two_options(), Some(30), now - Duration::seconds(10))
            .await
            .expect("create");

        let state = get_active_poll(&db, now).await.expect("read").expect("some");
        assert_eq!(state.poll.id, poll.id);
        assert_eq!(state.remaining_secs, 20);
        assert_eq!(state.tally.total, 0);
    }

    #[tokio::test]
    async fn complete_is_idempotent_and_missing_is_not_found() {
        let db = setup_db("lifecycle-complete").await;
        let poll = create_poll(&db, "Done?", &two_options(), Some(30), Utc::now())
            .await
            .expect("create");

        let first = complete_poll(&db, &poll.id).await.expect("first");
        assert_eq!(first.status, PollStatus::Completed);
        let second = complete_poll(&db, &poll.id).await.expect("second");
        assert_eq!(second.status, PollStatus::Completed);

        assert!(matches!(
            complete_poll(&db, "missing").await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn history_is_newest_first_with_tallies() {
        let db = setup_db("lifecycle-history").await;
        let now = Utc::now();

        let older = create_poll(
            &db,
            "Older?",
            &two_options(),
            Some(30),
            now - Duration::seconds(120),
        )
        .await
        .expect("older");
        complete_poll(&db, &older.id).await.expect("complete older");

        let newer = create_poll(&db, "Newer?", &two_options(), Some(30), now - Duration::seconds(3))
            .await
            .expect("newer");
        complete_poll(&db, &newer.id).await.expect("complete newer");

        let history = get_history(&db).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].poll.id, newer.id);
        assert_eq!(history[1].poll.id, older.id);
    }
}
