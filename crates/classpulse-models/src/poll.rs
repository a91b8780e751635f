use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Question/time-limit bounds enforced at creation time.
pub const MIN_QUESTION_LEN: usize = 3;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;
pub const MIN_TIME_LIMIT_SECS: i64 = 10;
pub const MAX_TIME_LIMIT_SECS: i64 = 120;
pub const DEFAULT_TIME_LIMIT_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Completed,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(PollStatus::Active),
            "completed" => Some(PollStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    /// Stable opaque identifier, assigned at poll creation.
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    /// Seconds, bounded [10, 120].
    pub time_limit: i64,
    pub status: PollStatus,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Whole seconds elapsed since the poll started, measured at `now`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds()
    }

    /// Remaining whole seconds, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.time_limit - self.elapsed_secs(now)).max(0)
    }

    /// True once the deadline has passed, regardless of stored status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs(now) >= self.time_limit
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}
