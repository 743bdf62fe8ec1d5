use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::metrics::{record_outcome, QUIZ_SUBMISSIONS_TOTAL};
use crate::models::{
    AnswerOption, Attempt, Identity, PaymentStatus, Question, SubmitQuizResponse,
};
use crate::repository::{RepositoryError, Store};

/// Upper bound for the reported time spent on a quiz: one day
pub const MAX_ELAPSED_SECONDS: i64 = 86_400;

/// Keeps only answers for known questions whose value is exactly "A", "B", "C" or "D".
/// Anything that is not a JSON object is rejected outright.
pub fn sanitize_answers(
    answers: &Value,
    questions: &[Question],
) -> CoreResult<BTreeMap<String, AnswerOption>> {
    let submitted = answers.as_object().ok_or(CoreError::InvalidAnswersFormat)?;
    let known: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();

    Ok(submitted
        .iter()
        .filter(|(question_id, _)| known.contains(question_id.as_str()))
        .filter_map(|(question_id, value)| {
            value
                .as_str()
                .and_then(AnswerOption::parse)
                .map(|option| (question_id.clone(), option))
        })
        .collect())
}

/// Number of questions answered with the stored correct option.
pub fn score(answers: &BTreeMap<String, AnswerOption>, questions: &[Question]) -> i32 {
    let correct = questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_option))
        .count();
    i32::try_from(correct).unwrap_or(i32::MAX)
}

pub fn clamp_elapsed(seconds: f64) -> i64 {
    if !seconds.is_finite() {
        return 0;
    }
    // The float-to-int cast saturates, the clamp does the rest
    (seconds.round() as i64).clamp(0, MAX_ELAPSED_SECONDS)
}

pub struct AttemptService {
    store: Arc<dyn Store>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Scores a submission against the stored answer key and records the single attempt
    /// allowed for this identity.
    pub async fn submit_quiz(
        &self,
        quiz_id: &str,
        payment_id: &str,
        answers: &Value,
        time_spent_seconds: f64,
        identity: &Identity,
    ) -> CoreResult<SubmitQuizResponse> {
        let result = self
            .submit(quiz_id, payment_id, answers, time_spent_seconds, identity)
            .await;
        match &result {
            Ok(_) => record_outcome(&QUIZ_SUBMISSIONS_TOTAL, "recorded"),
            Err(e) => record_outcome(&QUIZ_SUBMISSIONS_TOTAL, e.code()),
        }
        result
    }

    async fn submit(
        &self,
        quiz_id: &str,
        payment_id: &str,
        answers: &Value,
        time_spent_seconds: f64,
        identity: &Identity,
    ) -> CoreResult<SubmitQuizResponse> {
        let identity_key = identity.key();

        let payment = self
            .store
            .find_payment_by_id(payment_id, quiz_id, &identity_key, PaymentStatus::Success)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    quiz_id,
                    payment_id,
                    identity = %identity_key,
                    "Submission without a successful payment"
                );
                CoreError::PaymentRequired
            })?;

        let questions = self.store.list_questions(quiz_id).await?;
        if questions.is_empty() {
            return Err(CoreError::QuizNotFound);
        }

        let sanitized = sanitize_answers(answers, &questions)?;
        let score = score(&sanitized, &questions);
        let total_questions = i32::try_from(questions.len()).unwrap_or(i32::MAX);

        let display_name = identity
            .display_name()
            .or_else(|| payment.guest.as_ref().map(|g| g.name.clone()));

        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz_id.to_string(),
            identity_key: identity_key.clone(),
            payment_id: payment.id,
            display_name,
            answers: sanitized,
            score,
            total_questions,
            time_spent_seconds: clamp_elapsed(time_spent_seconds),
            submitted_at: Utc::now(),
        };

        match self.store.insert_attempt(&attempt).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(_)) => {
                tracing::warn!(
                    quiz_id,
                    identity = %identity_key,
                    "Duplicate submission rejected"
                );
                return Err(CoreError::AlreadySubmitted);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            quiz_id,
            identity = %identity_key,
            score,
            total_questions,
            time_spent_seconds = attempt.time_spent_seconds,
            "Quiz attempt recorded"
        );

        Ok(SubmitQuizResponse {
            success: true,
            score,
            total_questions,
            attempt: attempt.into(),
        })
    }
}
