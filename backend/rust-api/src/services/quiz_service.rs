use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::models::{Identity, Participation, PaymentStatus, QuestionView, Quiz, QuizSummary};
use crate::repository::Store;
use crate::services::leaderboard_service::quiz_published_at;
use crate::utils::time::civil_date;

pub struct QuizService {
    store: Arc<dyn Store>,
    offset_minutes: i32,
}

impl QuizService {
    pub fn new(store: Arc<dyn Store>, offset_minutes: i32) -> Self {
        Self {
            store,
            offset_minutes,
        }
    }

    fn summary(&self, quiz: Quiz) -> QuizSummary {
        let results_published_at = quiz_published_at(&quiz, self.offset_minutes);
        QuizSummary {
            id: quiz.id,
            quiz_date: quiz.quiz_date,
            title: quiz.title,
            description: quiz.description,
            entry_fee: quiz.entry_fee,
            prize_pool: quiz.prize_pool,
            results_time: quiz.results_time,
            results_published_at,
        }
    }

    pub async fn get_today_quiz(&self, now: DateTime<Utc>) -> CoreResult<QuizSummary> {
        let today = civil_date(now, self.offset_minutes).ok_or_else(|| {
            CoreError::Internal(format!("Invalid UTC offset: {}", self.offset_minutes))
        })?;

        let quiz = self
            .store
            .find_active_quiz_by_date(today)
            .await?
            .ok_or_else(|| {
                tracing::debug!(%today, "No active quiz for today");
                CoreError::QuizNotFound
            })?;

        Ok(self.summary(quiz))
    }

    pub async fn get_participation(
        &self,
        quiz_id: &str,
        identity: &Identity,
    ) -> CoreResult<Participation> {
        if self.store.find_quiz(quiz_id).await?.is_none() {
            return Err(CoreError::QuizNotFound);
        }

        let identity_key = identity.key();
        let payment = self
            .store
            .find_payment(quiz_id, &identity_key, PaymentStatus::Success)
            .await?;
        let attempt = self.store.find_attempt(quiz_id, &identity_key).await?;

        Ok(Participation {
            quiz_id: quiz_id.to_string(),
            has_paid: payment.is_some(),
            payment_id: payment.map(|p| p.id),
            has_submitted: attempt.is_some(),
            score: attempt.as_ref().map(|a| a.score),
            total_questions: attempt.as_ref().map(|a| a.total_questions),
        })
    }

    /// Questions for a paid player, answer key stripped.
    pub async fn get_questions(
        &self,
        quiz_id: &str,
        payment_id: &str,
        identity: &Identity,
    ) -> CoreResult<Vec<QuestionView>> {
        let identity_key = identity.key();
        if self
            .store
            .find_payment_by_id(payment_id, quiz_id, &identity_key, PaymentStatus::Success)
            .await?
            .is_none()
        {
            tracing::warn!(
                quiz_id,
                payment_id,
                identity = %identity_key,
                "Question fetch without a successful payment"
            );
            return Err(CoreError::PaymentRequired);
        }

        let questions = self.store.list_questions(quiz_id).await?;
        if questions.is_empty() {
            return Err(CoreError::QuizNotFound);
        }

        Ok(questions.into_iter().map(QuestionView::from).collect())
    }
}
