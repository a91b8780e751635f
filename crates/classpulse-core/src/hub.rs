//! Presence and fan-out: shapes state for each recipient role, tracks the
//! live student count, and pushes every state transition to the connected
//! channels through the event bus.
//!
//! Outbound payloads:
//! - `state-snapshot`: poll (or null), remaining_time, vote_counts,
//!   total_votes, student_count; student channels additionally get
//!   has_voted and selected_option_id.
//! - `new-poll`: poll, remaining_time.
//! - `vote-accepted` (voter only): poll_id, option_id.
//! - `vote-rejected` (voter only): message.
//! - `tally-update`: poll_id, vote_counts, total_votes.
//! - `poll-ended`: poll_id, final_results, total_votes.
//! - `live-count-update`: count.

use crate::error::CoreError;
use crate::lifecycle::{self, ActivePollState};
use crate::{ledger, AppState};
use chrono::Utc;
use classpulse_models::{Poll, ServerEventKind, VoteTally};
use serde_json::{json, Value};
use std::time::Duration;

fn empty_snapshot(student_count: i64, for_student: bool) -> Value {
    let mut snapshot = json!({
        "poll": null,
        "remaining_time": 0,
        "vote_counts": {},
        "total_votes": 0,
        "student_count": student_count,
    });
    if for_student {
        snapshot["has_voted"] = json!(false);
        snapshot["selected_option_id"] = Value::Null;
    }
    snapshot
}

fn active_snapshot(state: &ActivePollState, student_count: i64) -> Value {
    json!({
        "poll": state.poll,
        "remaining_time": state.remaining_secs,
        "vote_counts": state.tally.counts,
        "total_votes": state.tally.total,
        "student_count": student_count,
    })
}

async fn student_count(state: &AppState) -> i64 {
    classpulse_db::students::count_connected(&state.db)
        .await
        .unwrap_or(0)
}

/// Send the current state to a freshly joined teacher channel.
///
/// A degraded store yields an empty snapshot instead of an error: the
/// dashboard keeps working with stale/empty state.
pub async fn teacher_join(state: &AppState, channel_id: &str) {
    let count = student_count(state).await;
    let snapshot = match lifecycle::get_active_poll(&state.db, Utc::now()).await {
        Ok(Some(active)) => active_snapshot(&active, count),
        Ok(None) => empty_snapshot(count, false),
        Err(e) => {
            tracing::warn!(error = %e, "teacher join: falling back to empty snapshot");
            empty_snapshot(count, false)
        }
    };
    state
        .event_bus
        .publish_channel(channel_id, ServerEventKind::StateSnapshot, snapshot);
}

/// Attach a student channel: record presence, broadcast the new live count,
/// and send the role-shaped snapshot (including the student's own vote
/// status) to the joining channel.
pub async fn student_join(state: &AppState, channel_id: &str, session_id: &str, name: &str) {
    let now = Utc::now();
    if let Err(e) = classpulse_db::students::upsert_student(&state.db, session_id, name, now).await
    {
        tracing::warn!(error = %e, session_id, "student join: could not record session");
    }
    if let Err(e) =
        classpulse_db::students::set_channel(&state.db, session_id, Some(channel_id), now).await
    {
        tracing::warn!(error = %e, session_id, "student join: could not attach channel");
    }

    broadcast_live_count(state).await;

    let count = student_count(state).await;
    let snapshot = match lifecycle::get_active_poll(&state.db, now).await {
        Ok(Some(active)) => {
            let mut snapshot = active_snapshot(&active, count);
            match ledger::has_voted(&state.db, &active.poll.id, session_id).await {
                Ok(status) => {
                    snapshot["has_voted"] = json!(status.has_voted);
                    snapshot["selected_option_id"] = json!(status.selected_option_id);
                }
                Err(e) => {
                    tracing::warn!(error = %e, session_id, "student join: vote status unavailable");
                    snapshot["has_voted"] = json!(false);
                    snapshot["selected_option_id"] = Value::Null;
                }
            }
            snapshot
        }
        Ok(None) => empty_snapshot(count, true),
        Err(e) => {
            tracing::warn!(error = %e, "student join: falling back to empty snapshot");
            empty_snapshot(count, true)
        }
    };
    state
        .event_bus
        .publish_channel(channel_id, ServerEventKind::StateSnapshot, snapshot);

    tracing::info!(session_id, name, "student joined");
}

/// Detach a channel on disconnect. Only the channel that is still current
/// for the session decrements the live count; a reconnect that already
/// superseded it leaves the count alone.
pub async fn disconnect(state: &AppState, channel_id: &str, session_id: Option<&str>) {
    let Some(session_id) = session_id else {
        return;
    };
    match classpulse_db::students::clear_channel_if_current(
        &state.db,
        session_id,
        channel_id,
        Utc::now(),
    )
    .await
    {
        Ok(true) => broadcast_live_count(state).await,
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, session_id, "disconnect: could not clear channel"),
    }
}

pub async fn broadcast_live_count(state: &AppState) {
    let count = student_count(state).await;
    state
        .event_bus
        .publish_all(ServerEventKind::LiveCountUpdate, json!({ "count": count }));
}

/// Create a poll, arm its timer, and broadcast `new-poll` to every channel.
/// Errors propagate to the caller, which translates them for its transport.
pub async fn create_poll(
    state: &AppState,
    question: &str,
    options: &[String],
    time_limit: Option<i64>,
) -> Result<Poll, CoreError> {
    let poll = lifecycle::create_poll(&state.db, question, options, time_limit, Utc::now()).await?;

    start_poll_timer(state, &poll.id, Duration::from_secs(poll.time_limit as u64));
    state.event_bus.publish_all(
        ServerEventKind::NewPoll,
        json!({ "poll": poll, "remaining_time": poll.time_limit }),
    );
    tracing::info!(poll_id = %poll.id, question = %poll.question, time_limit = poll.time_limit, "new poll created");
    Ok(poll)
}

/// Admit a vote: acknowledge the voter directly and broadcast the fresh
/// tally to every channel. Rejections go to the voter's channel only, with
/// the human-readable reason.
pub async fn submit_vote(
    state: &AppState,
    channel_id: &str,
    session_id: &str,
    student_name: &str,
    poll_id: &str,
    option_id: &str,
) -> Result<VoteTally, CoreError> {
    match ledger::submit_vote(
        &state.db,
        poll_id,
        session_id,
        student_name,
        option_id,
        Utc::now(),
    )
    .await
    {
        Ok((vote, tally)) => {
            state.event_bus.publish_channel(
                channel_id,
                ServerEventKind::VoteAccepted,
                json!({ "poll_id": poll_id, "option_id": option_id }),
            );
            state.event_bus.publish_all(
                ServerEventKind::TallyUpdate,
                json!({
                    "poll_id": poll_id,
                    "vote_counts": tally.counts,
                    "total_votes": tally.total,
                }),
            );
            tracing::info!(student = %vote.student_name, option_id, "vote accepted");
            Ok(tally)
        }
        Err(e) => {
            state.event_bus.publish_channel(
                channel_id,
                ServerEventKind::VoteRejected,
                json!({ "message": e.to_string() }),
            );
            // A pending timer means the deadline passed without it firing
            // and this vote just lazily completed the poll; everyone gets
            // the final results and the obsolete timer goes away.
            if matches!(e, CoreError::Expired(_)) && state.timers.is_scheduled(poll_id) {
                state.timers.cancel(poll_id);
                let tally = ledger::tally_for_poll(&state.db, poll_id)
                    .await
                    .unwrap_or_default();
                state.event_bus.publish_all(
                    ServerEventKind::PollEnded,
                    json!({
                        "poll_id": poll_id,
                        "final_results": tally.counts,
                        "total_votes": tally.total,
                    }),
                );
            }
            Err(e)
        }
    }
}

/// Arm the server-side countdown for a poll. When it fires, the poll is
/// completed, the final tally recomputed, and `poll-ended` broadcast to all
/// channels. A failure to persist completion is logged and the timer
/// discarded without retry; lazy expiry on the read paths corrects the
/// state afterwards.
pub fn start_poll_timer(state: &AppState, poll_id: &str, remaining: Duration) {
    let task_state = state.clone();
    let task_poll_id = poll_id.to_string();
    state.timers.schedule(poll_id, remaining, async move {
        match lifecycle::complete_poll(&task_state.db, &task_poll_id).await {
            Ok(_) => {
                let tally = ledger::tally_for_poll(&task_state.db, &task_poll_id)
                    .await
                    .unwrap_or_default();
                task_state.event_bus.publish_all(
                    ServerEventKind::PollEnded,
                    json!({
                        "poll_id": task_poll_id,
                        "final_results": tally.counts,
                        "total_votes": tally.total,
                    }),
                );
                tracing::info!(poll_id = %task_poll_id, "poll ended by timer");
            }
            Err(e) => {
                tracing::error!(poll_id = %task_poll_id, error = %e, "timer could not complete poll");
            }
        }
    });
}

/// On process start, re-arm the countdown for a persisted active poll. The
/// deadline derives from started_at + time_limit, so a restart 20 seconds
/// into a 60-second poll fires 40 seconds later, not 60.
pub async fn resume_on_startup(state: &AppState) {
    match lifecycle::get_active_poll(&state.db, Utc::now()).await {
        Ok(Some(active)) if active.remaining_secs > 0 => {
            tracing::info!(
                poll_id = %active.poll.id,
                remaining = active.remaining_secs,
                "resuming timer for active poll"
            );
            start_poll_timer(
                state,
                &active.poll.id,
                Duration::from_secs(active.remaining_secs as u64),
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "skipping poll resume"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Role;
    use crate::test_support::setup_state;
    use crate::timer::TimerRegistry;
    use chrono::Duration as ChronoDuration;
    use classpulse_models::PollStatus;
    use std::sync::Arc;
    use tokio::sync::broadcast::Receiver;
    use tokio::time::{timeout, Duration as TokioDuration};

    async fn next_of_kind(
        rx: &mut Receiver<crate::events::HubEvent>,
        kind: ServerEventKind,
    ) -> Value {
        loop {
            let event = timeout(TokioDuration::from_secs(2), rx.recv())
                .await
                .expect("event within deadline")
                .expect("channel open");
            if event.kind == kind {
                return event.payload;
            }
        }
    }

    #[tokio::test]
    async fn teacher_join_receives_a_snapshot_without_vote_status() {
        let state = setup_state("hub-teacher").await;
        let mut rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);

        teacher_join(&state, "ch-t").await;

        let payload = next_of_kind(&mut rx, ServerEventKind::StateSnapshot).await;
        assert!(payload["poll"].is_null());
        assert_eq!(payload["student_count"], 0);
        assert!(payload.get("has_voted").is_none());
    }

    #[tokio::test]
    async fn student_join_gets_vote_status_and_everyone_gets_the_count() {
        let state = setup_state("hub-student").await;
        let mut teacher_rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);
        let mut student_rx =
            state
                .event_bus
                .register_channel("ch-s", Role::Student, Some("s1".into()));

        student_join(&state, "ch-s", "s1", "Ada").await;

        let count = next_of_kind(&mut teacher_rx, ServerEventKind::LiveCountUpdate).await;
        assert_eq!(count["count"], 1);

        let snapshot = next_of_kind(&mut student_rx, ServerEventKind::StateSnapshot).await;
        assert_eq!(snapshot["has_voted"], false);
        assert_eq!(snapshot["student_count"], 1);
    }

    #[tokio::test]
    async fn create_poll_broadcasts_and_arms_the_timer() {
        let state = setup_state("hub-create").await;
        let mut rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);

        let poll = create_poll(
            &state,
            "Pick a color?",
            &["Red".into(), "Blue".into()],
            Some(30),
        )
        .await
        .expect("create");

        let payload = next_of_kind(&mut rx, ServerEventKind::NewPoll).await;
        assert_eq!(payload["remaining_time"], 30);
        assert_eq!(payload["poll"]["question"], "Pick a color?");
        assert!(state.timers.is_scheduled(&poll.id));
    }

    #[tokio::test]
    async fn accepted_vote_acknowledges_the_voter_and_updates_everyone() {
        let state = setup_state("hub-vote").await;
        let poll = create_poll(&state, "Pick one?", &["A".into(), "B".into()], Some(60))
            .await
            .expect("create");
        let option = poll.options[0].id.clone();

        let mut teacher_rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);
        let mut voter_rx =
            state
                .event_bus
                .register_channel("ch-s", Role::Student, Some("s1".into()));

        submit_vote(&state, "ch-s", "s1", "Ada", &poll.id, &option)
            .await
            .expect("vote");

        let ack = next_of_kind(&mut voter_rx, ServerEventKind::VoteAccepted).await;
        assert_eq!(ack["option_id"], option.as_str());

        let tally = next_of_kind(&mut teacher_rx, ServerEventKind::TallyUpdate).await;
        assert_eq!(tally["total_votes"], 1);
        assert_eq!(tally["vote_counts"][&option], 1);
    }

    #[tokio::test]
    async fn rejected_vote_reaches_only_the_voter_with_the_reason() {
        let state = setup_state("hub-reject").await;
        let poll = create_poll(&state, "Pick one?", &["A".into(), "B".into()], Some(60))
            .await
            .expect("create");
        let a = poll.options[0].id.clone();
        let b = poll.options[1].id.clone();

        submit_vote(&state, "ch-s", "s1", "Ada", &poll.id, &a)
            .await
            .expect("first vote");

        let mut teacher_rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);
        let mut voter_rx =
            state
                .event_bus
                .register_channel("ch-s", Role::Student, Some("s1".into()));

        let err = submit_vote(&state, "ch-s", "s1", "Ada", &poll.id, &b)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, CoreError::Conflict(_)));

        let rejection = next_of_kind(&mut voter_rx, ServerEventKind::VoteRejected).await;
        assert_eq!(rejection["message"], "You have already voted on this poll");
        assert!(teacher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_vote_trips_lazy_expiry_and_broadcasts_final_results() {
        let state = setup_state("hub-lazy").await;
        // Deadline already passed, but the timer is still armed as if it
        // had drifted.
        let poll = lifecycle::create_poll(
            &state.db,
            "Too late?",
            &["A".into(), "B".into()],
            Some(30),
            Utc::now() - ChronoDuration::seconds(45),
        )
        .await
        .expect("create");
        start_poll_timer(&state, &poll.id, TokioDuration::from_secs(60));

        let mut teacher_rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);
        let mut voter_rx =
            state
                .event_bus
                .register_channel("ch-s", Role::Student, Some("s1".into()));

        let err = submit_vote(&state, "ch-s", "s1", "Ada", &poll.id, &poll.options[0].id)
            .await
            .expect_err("past deadline");
        assert!(matches!(err, CoreError::Expired(_)));

        let rejection = next_of_kind(&mut voter_rx, ServerEventKind::VoteRejected).await;
        assert_eq!(rejection["message"], "Time has expired for this poll");

        let ended = next_of_kind(&mut teacher_rx, ServerEventKind::PollEnded).await;
        assert_eq!(ended["poll_id"], poll.id.as_str());
        assert!(!state.timers.is_scheduled(&poll.id));
    }

    #[tokio::test]
    async fn timer_fire_completes_the_poll_and_broadcasts_final_results() {
        let state = setup_state("hub-timer").await;
        let poll = create_poll(&state, "Quick one?", &["A".into(), "B".into()], Some(60))
            .await
            .expect("create");
        let option = poll.options[0].id.clone();
        submit_vote(&state, "ch-s", "s1", "Ada", &poll.id, &option)
            .await
            .expect("vote");

        let mut rx = state.event_bus.register_channel("ch-t", Role::Teacher, None);
        // Supersede the 60s timer with an immediate one.
        start_poll_timer(&state, &poll.id, TokioDuration::from_millis(50));

        let ended = next_of_kind(&mut rx, ServerEventKind::PollEnded).await;
        assert_eq!(ended["poll_id"], poll.id.as_str());
        assert_eq!(ended["total_votes"], 1);

        let stored = classpulse_db::polls::get_poll(&state.db, &poll.id)
            .await
            .expect("get")
            .expect("some");
        assert_eq!(stored.status, PollStatus::Completed);
    }

    #[tokio::test]
    async fn resume_rearms_from_the_persisted_deadline() {
        let state = setup_state("hub-resume").await;
        // A poll created 20s ago with a 60s limit, persisted but with no
        // in-memory timer, as after a process restart.
        let poll = lifecycle::create_poll(
            &state.db,
            "Survives restarts?",
            &["Yes".into(), "No".into()],
            Some(60),
            Utc::now() - ChronoDuration::seconds(20),
        )
        .await
        .expect("create");

        // Fresh registry simulates the restarted process.
        let restarted = AppState {
            timers: Arc::new(TimerRegistry::new()),
            ..state.clone()
        };
        assert!(!restarted.timers.is_scheduled(&poll.id));

        resume_on_startup(&restarted).await;
        assert!(restarted.timers.is_scheduled(&poll.id));
    }

    #[tokio::test]
    async fn resume_skips_expired_polls_and_heals_their_status() {
        let state = setup_state("hub-resume-expired").await;
        let poll = lifecycle::create_poll(
            &state.db,
            "Long gone?",
            &["Yes".into(), "No".into()],
            Some(30),
            Utc::now() - ChronoDuration::seconds(45),
        )
        .await
        .expect("create");

        resume_on_startup(&state).await;
        assert!(!state.timers.is_scheduled(&poll.id));

        let stored = classpulse_db::polls::get_poll(&state.db, &poll.id)
            .await
            .expect("get")
            .expect("some");
        assert_eq!(stored.status, PollStatus::Completed);
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_the_count_after_a_reconnect() {
        let state = setup_state("hub-reconnect").await;
        student_join(&state, "ch-old", "s1", "Ada").await;
        // Reconnect with a new channel before the old teardown runs.
        student_join(&state, "ch-new", "s1", "Ada").await;

        disconnect(&state, "ch-old", Some("s1")).await;
        assert_eq!(
            classpulse_db::students::count_connected(&state.db)
                .await
                .expect("count"),
            1
        );

        disconnect(&state, "ch-new", Some("s1")).await;
        assert_eq!(
            classpulse_db::students::count_connected(&state.db)
                .await
                .expect("count"),
            0
        );
    }
}
