mod handler;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use classpulse_core::AppState;
use std::collections::BTreeSet;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn default_allowed_origins() -> BTreeSet<String> {
    [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ]
    .into_iter()
    .map(normalize_origin)
    .collect()
}

fn build_allowed_origins(state: &AppState) -> BTreeSet<String> {
    let mut allowed = default_allowed_origins();

    if let Some(public_url) = state.config.public_url.as_deref() {
        if !public_url.trim().is_empty() {
            allowed.insert(normalize_origin(public_url));
        }
    }

    if let Ok(raw) = std::env::var("CLASSPULSE_WS_ALLOWED_ORIGINS") {
        for origin in raw.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            allowed.insert(normalize_origin(origin));
        }
    }

    allowed
}

fn is_origin_allowed(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        // Non-browser callers typically omit Origin.
        return true;
    };

    let normalized = normalize_origin(origin);
    if build_allowed_origins(state).contains(&normalized) {
        return true;
    }

    // Same-origin upgrades are allowed even without explicit configuration;
    // host:port must still match.
    if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        let origin_no_scheme = origin
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        return origin_no_scheme == host.trim().to_ascii_lowercase();
    }

    false
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !is_origin_allowed(&headers, &state) {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.max_message_size(16 * 1024)
        .max_frame_size(16 * 1024)
        .on_upgrade(move |socket| handler::handle_connection(socket, state))
        .into_response()
}
