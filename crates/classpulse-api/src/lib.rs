pub mod error;
pub mod middleware;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use classpulse_core::AppState;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/api/polls", post(routes::polls::create_poll))
        .route("/api/polls/active", get(routes::polls::get_active_poll))
        .route("/api/polls/history", get(routes::polls::get_poll_history))
        .route("/api/polls/{id}", get(routes::polls::get_poll))
        .route("/api/polls/{id}/votes", post(routes::polls::submit_vote))
        .route("/api/students/register", post(routes::students::register))
        .route(
            "/api/students/{session_id}",
            get(routes::students::get_by_session_id),
        )
}
