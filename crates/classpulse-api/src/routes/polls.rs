use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use classpulse_core::error::CoreError;
use classpulse_core::lifecycle::PollWithTally;
use classpulse_core::{hub, ledger, lifecycle, AppState};
use classpulse_models::ServerEventKind;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthTeacher;

fn poll_with_tally_json(entry: &PollWithTally) -> Value {
    json!({
        "poll": entry.poll,
        "vote_counts": entry.tally.counts,
        "total_votes": entry.tally.total,
    })
}

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub time_limit: Option<i64>,
}

/// POST /api/polls — teacher only. Creates and activates the poll, arms its
/// timer, and broadcasts `new-poll` to every connected channel.
pub async fn create_poll(
    State(state): State<AppState>,
    _auth: AuthTeacher,
    Json(body): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let poll = hub::create_poll(&state, &body.question, &body.options, body.time_limit).await?;
    Ok((StatusCode::CREATED, Json(json!({ "poll": poll }))))
}

/// GET /api/polls/active — the active poll with remaining time and tally,
/// or null. A degraded store also yields null rather than an error.
pub async fn get_active_poll(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match lifecycle::get_active_poll(&state.db, Utc::now()).await {
        Ok(Some(active)) => Ok(Json(json!({
            "poll": active.poll,
            "remaining_time": active.remaining_secs,
            "vote_counts": active.tally.counts,
            "total_votes": active.tally.total,
        }))),
        Ok(None) => Ok(Json(Value::Null)),
        Err(CoreError::Unavailable(msg)) => {
            tracing::warn!(error = %msg, "active poll read degraded to null");
            Ok(Json(Value::Null))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/polls/history — completed polls with tallies, newest first.
/// Degrades to an empty list when the store is unreachable.
pub async fn get_poll_history(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match lifecycle::get_history(&state.db).await {
        Ok(history) => {
            let entries: Vec<Value> = history.iter().map(poll_with_tally_json).collect();
            Ok(Json(json!(entries)))
        }
        Err(CoreError::Unavailable(msg)) => {
            tracing::warn!(error = %msg, "history read degraded to empty");
            Ok(Json(json!([])))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/polls/{id}
pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let entry = lifecycle::get_poll(&state.db, &poll_id).await?;
    Ok(Json(poll_with_tally_json(&entry)))
}

#[derive(Deserialize)]
pub struct SubmitVoteRequest {
    pub student_id: String,
    pub student_name: String,
    pub option_id: String,
}

/// POST /api/polls/{id}/votes — vote over the request/response surface.
/// Identity arrives already resolved in the payload; the accepted vote is
/// acknowledged to the student's live session and the fresh tally broadcast
/// to every channel, same as a vote over the gateway.
pub async fn submit_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Json(body): Json<SubmitVoteRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (vote, tally) = ledger::submit_vote(
        &state.db,
        &poll_id,
        &body.student_id,
        &body.student_name,
        &body.option_id,
        Utc::now(),
    )
    .await?;

    state.event_bus.publish_session(
        &body.student_id,
        ServerEventKind::VoteAccepted,
        json!({ "poll_id": poll_id, "option_id": body.option_id }),
    );
    state.event_bus.publish_all(
        ServerEventKind::TallyUpdate,
        json!({
            "poll_id": poll_id,
            "vote_counts": tally.counts,
            "total_votes": tally.total,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "vote": vote,
            "vote_counts": tally.counts,
            "total_votes": tally.total,
        })),
    ))
}
