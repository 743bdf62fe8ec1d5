use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::quiz::AnswerOption;

/// Terminal quiz attempt stored in MongoDB "quiz_attempts" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub identity_key: String,
    /// Payment record that authorized the attempt
    pub payment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sanitized answers, question id -> option
    pub answers: BTreeMap<String, AnswerOption>,
    pub score: i32,
    pub total_questions: i32,
    pub time_spent_seconds: i64,
    #[serde(with = "bson_datetime_as_chrono")]
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub id: String,
    pub quiz_id: String,
    pub answers: BTreeMap<String, AnswerOption>,
    pub score: i32,
    pub total_questions: i32,
    pub time_spent_seconds: i64,
    pub submitted_at: DateTime<Utc>,
}

impl From<Attempt> for AttemptView {
    fn from(attempt: Attempt) -> Self {
        AttemptView {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            answers: attempt.answers,
            score: attempt.score,
            total_questions: attempt.total_questions,
            time_spent_seconds: attempt.time_spent_seconds,
            submitted_at: attempt.submitted_at,
        }
    }
}

/// Quiz submission. `answers` stays untyped here; its shape is checked by the scorer so
/// malformed entries can be dropped instead of failing the whole request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    #[validate(length(min = 1, max = 64, message = "paymentId is required"))]
    pub payment_id: String,

    #[serde(default)]
    pub answers: serde_json::Value,

    pub time_spent_seconds: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResponse {
    pub success: bool,
    pub attempt: AttemptView,
    pub score: i32,
    pub total_questions: i32,
}
