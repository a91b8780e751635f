use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One student's vote on one poll. Immutable once recorded; the
/// (poll_id, student_id) pair is unique at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub poll_id: String,
    /// Stable per browser session, not per person.
    pub student_id: String,
    pub student_name: String,
    pub option_id: String,
    pub created_at: DateTime<Utc>,
}
