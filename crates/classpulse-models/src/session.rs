use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence record for a student, keyed by a client-generated session id.
/// Kept across reloads for state recovery; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSession {
    pub session_id: String,
    pub name: String,
    /// Set while a live channel is attached, cleared on disconnect.
    pub channel_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
