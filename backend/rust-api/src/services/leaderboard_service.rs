use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{CoreError, CoreResult};
use crate::models::{LeaderboardEntry, LeaderboardResponse, Quiz};
use crate::repository::Store;
use crate::utils::time::fixed_offset;

const FALLBACK_DISPLAY_NAME: &str = "Player";

/// Instant at which `quiz_date` + `results_time` is reached in the given civil offset.
pub fn results_published_at(
    quiz_date: NaiveDate,
    results_time: NaiveTime,
    offset_minutes: i32,
) -> Option<DateTime<FixedOffset>> {
    fixed_offset(offset_minutes)?
        .from_local_datetime(&quiz_date.and_time(results_time))
        .single()
}

/// Publication instant of a stored quiz; `None` when its results time is malformed.
pub fn quiz_published_at(quiz: &Quiz, offset_minutes: i32) -> Option<DateTime<FixedOffset>> {
    results_published_at(quiz.quiz_date, quiz.parsed_results_time()?, offset_minutes)
}

pub fn is_published(published_at: DateTime<FixedOffset>, now: DateTime<Utc>) -> bool {
    now >= published_at
}

pub struct LeaderboardService {
    store: Arc<dyn Store>,
    offset_minutes: i32,
    limit: i64,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn Store>, offset_minutes: i32, limit: i64) -> Self {
        Self {
            store,
            offset_minutes,
            limit,
        }
    }

    pub async fn get_leaderboard(
        &self,
        quiz_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<LeaderboardResponse> {
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or(CoreError::QuizNotFound)?;

        let published_at = quiz_published_at(&quiz, self.offset_minutes).ok_or_else(|| {
            CoreError::Internal(format!(
                "Quiz {} has an invalid results time {:?}",
                quiz.id, quiz.results_time
            ))
        })?;

        if !is_published(published_at, now) {
            tracing::debug!(quiz_id, %published_at, "Leaderboard not yet published");
            return Ok(LeaderboardResponse {
                quiz_id: quiz.id,
                published: false,
                published_at,
                entries: None,
            });
        }

        let entries = self
            .store
            .top_attempts(quiz_id, self.limit)
            .await?
            .into_iter()
            .zip(1u32..)
            .map(|(attempt, rank)| LeaderboardEntry {
                rank,
                display_name: attempt
                    .display_name
                    .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string()),
                score: attempt.score,
                total_questions: attempt.total_questions,
                time_spent_seconds: attempt.time_spent_seconds,
                submitted_at: attempt.submitted_at,
            })
            .collect();

        Ok(LeaderboardResponse {
            quiz_id: quiz.id,
            published: true,
            published_at,
            entries: Some(entries),
        })
    }
}
