use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub display_name: String,
    pub score: i32,
    pub total_questions: i32,
    pub time_spent_seconds: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Before publication only `publishedAt` is revealed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub quiz_id: String,
    pub published: bool,
    pub published_at: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<LeaderboardEntry>>,
}
