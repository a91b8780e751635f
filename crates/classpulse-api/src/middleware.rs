use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use classpulse_core::AppState;

use crate::error::ApiError;

/// Extractor for teacher-only endpoints. Validates the Bearer JWT and
/// requires the teacher role; credential issuance lives outside this crate.
pub struct AuthTeacher {
    pub subject: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .strip_prefix("Bearer ")
}

impl FromRequestParts<AppState> for AuthTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = classpulse_core::auth::validate_token(token, &state.config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized)?;

        if !claims.is_teacher() {
            return Err(ApiError::Forbidden);
        }

        Ok(AuthTeacher {
            subject: claims.sub,
        })
    }
}
