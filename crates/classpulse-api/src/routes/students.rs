use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use classpulse_core::AppState;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

const MIN_NAME_LEN: usize = 2;

#[derive(Deserialize)]
pub struct RegisterStudentRequest {
    pub name: String,
    pub session_id: String,
}

/// POST /api/students/register — create the session or refresh an existing
/// one by its client-chosen session id.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterStudentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = body.name.trim();
    if name.len() < MIN_NAME_LEN {
        return Err(ApiError::BadRequest(
            "Name must be at least 2 characters".into(),
        ));
    }
    if body.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Session ID is required".into()));
    }

    let student =
        classpulse_db::students::upsert_student(&state.db, &body.session_id, name, Utc::now())
            .await?;
    Ok((StatusCode::CREATED, Json(json!({ "student": student }))))
}

/// GET /api/students/{session_id} — state recovery on refresh.
pub async fn get_by_session_id(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let student = classpulse_db::students::get_student(&state.db, &session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "student": student })))
}
