//! In-process store with the same uniqueness rules as the MongoDB indexes.
//! Backs the integration tests, which drive the full router without MongoDB.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AttemptRepository, PaymentRepository, QuizRepository, RepositoryError, RepositoryResult,
    Store,
};
use crate::models::payment::PaymentConfirmation;
use crate::models::{Attempt, Payment, PaymentStatus, Question, Quiz};

#[derive(Default)]
struct Inner {
    quizzes: HashMap<String, Quiz>,
    questions: Vec<Question>,
    payments: Vec<Payment>,
    attempts: Vec<Attempt>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write below completes before the guard drops, so a poisoned lock
        // still holds consistent data
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        self.lock().quizzes.insert(quiz.id.clone(), quiz);
    }

    pub fn insert_questions(&self, questions: impl IntoIterator<Item = Question>) {
        self.lock().questions.extend(questions);
    }

    /// Every payment row for a quiz and identity, whatever its status
    pub fn payments_for(&self, quiz_id: &str, identity_key: &str) -> Vec<Payment> {
        self.lock()
            .payments
            .iter()
            .filter(|p| p.quiz_id == quiz_id && p.identity_key == identity_key)
            .cloned()
            .collect()
    }

    pub fn attempts_for(&self, quiz_id: &str) -> Vec<Attempt> {
        self.lock()
            .attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect()
    }
}

fn holds_slot(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Pending | PaymentStatus::Success)
}

#[async_trait]
impl QuizRepository for MemoryStore {
    async fn find_quiz(&self, quiz_id: &str) -> RepositoryResult<Option<Quiz>> {
        Ok(self.lock().quizzes.get(quiz_id).cloned())
    }

    async fn find_active_quiz_by_date(&self, date: NaiveDate) -> RepositoryResult<Option<Quiz>> {
        Ok(self
            .lock()
            .quizzes
            .values()
            .find(|q| q.quiz_date == date && q.is_active)
            .cloned())
    }

    async fn list_questions(&self, quiz_id: &str) -> RepositoryResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .lock()
            .questions
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_order);
        Ok(questions)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn find_payment(
        &self,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.quiz_id == quiz_id && p.identity_key == identity_key && p.status == status)
            .cloned())
    }

    async fn find_payment_by_id(
        &self,
        payment_id: &str,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| {
                p.id == payment_id
                    && p.quiz_id == quiz_id
                    && p.identity_key == identity_key
                    && p.status == status
            })
            .cloned())
    }

    async fn find_payment_by_order(
        &self,
        order_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.order_id == order_id && p.identity_key == identity_key)
            .cloned())
    }

    async fn insert_payment(&self, payment: &Payment) -> RepositoryResult<()> {
        let mut inner = self.lock();

        if inner.payments.iter().any(|p| p.order_id == payment.order_id) {
            return Err(RepositoryError::Duplicate("order id".to_string()));
        }

        let slot_taken = holds_slot(payment.status)
            && inner.payments.iter().any(|p| {
                p.quiz_id == payment.quiz_id
                    && p.identity_key == payment.identity_key
                    && holds_slot(p.status)
            });
        if slot_taken {
            return Err(RepositoryError::Duplicate(
                "open payment for quiz and identity".to_string(),
            ));
        }

        inner.payments.push(payment.clone());
        Ok(())
    }

    async fn confirm_payment(
        &self,
        order_id: &str,
        identity_key: &str,
        from: PaymentStatus,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<Option<Payment>> {
        let mut inner = self.lock();
        let Some(index) = inner.payments.iter().position(|p| {
            p.order_id == order_id
                && p.identity_key == identity_key
                && p.status == from
                && p.gateway_payment_id.is_none()
        }) else {
            return Ok(None);
        };

        if !holds_slot(from) {
            let quiz_id = inner.payments[index].quiz_id.clone();
            let slot_taken = inner.payments.iter().enumerate().any(|(i, p)| {
                i != index
                    && p.quiz_id == quiz_id
                    && p.identity_key == identity_key
                    && holds_slot(p.status)
            });
            if slot_taken {
                return Err(RepositoryError::Duplicate(
                    "open payment for quiz and identity".to_string(),
                ));
            }
        }

        let payment = &mut inner.payments[index];
        payment.status = PaymentStatus::Success;
        payment.gateway_payment_id = Some(confirmation.gateway_payment_id.clone());
        payment.signature = Some(confirmation.signature.clone());
        payment.verified_at = Some(confirmation.verified_at);
        payment.updated_at = confirmation.verified_at;
        if payment.guest.is_none() {
            payment.guest = confirmation.guest.clone();
        }

        Ok(Some(payment.clone()))
    }

    async fn record_capture(
        &self,
        order_id: &str,
        identity_key: &str,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<bool> {
        let mut inner = self.lock();
        let Some(payment) = inner.payments.iter_mut().find(|p| {
            p.order_id == order_id
                && p.identity_key == identity_key
                && p.status == PaymentStatus::Failed
                && p.gateway_payment_id.is_none()
        }) else {
            return Ok(false);
        };

        payment.gateway_payment_id = Some(confirmation.gateway_payment_id.clone());
        payment.signature = Some(confirmation.signature.clone());
        payment.updated_at = confirmation.verified_at;
        Ok(true)
    }

    async fn expire_pending_payment(
        &self,
        payment_id: &str,
        created_before: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut inner = self.lock();
        let Some(payment) = inner.payments.iter_mut().find(|p| {
            p.id == payment_id
                && p.status == PaymentStatus::Pending
                && p.created_at < created_before
        }) else {
            return Ok(false);
        };

        payment.status = PaymentStatus::Failed;
        payment.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn insert_attempt(&self, attempt: &Attempt) -> RepositoryResult<()> {
        let mut inner = self.lock();
        if inner
            .attempts
            .iter()
            .any(|a| a.quiz_id == attempt.quiz_id && a.identity_key == attempt.identity_key)
        {
            return Err(RepositoryError::Duplicate(
                "attempt for quiz and identity".to_string(),
            ));
        }
        inner.attempts.push(attempt.clone());
        Ok(())
    }

    async fn find_attempt(
        &self,
        quiz_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Attempt>> {
        Ok(self
            .lock()
            .attempts
            .iter()
            .find(|a| a.quiz_id == quiz_id && a.identity_key == identity_key)
            .cloned())
    }

    async fn top_attempts(&self, quiz_id: &str, limit: i64) -> RepositoryResult<Vec<Attempt>> {
        let mut attempts = self.attempts_for(quiz_id);
        attempts.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.time_spent_seconds.cmp(&b.time_spent_seconds))
                .then(a.submitted_at.cmp(&b.submitted_at))
        });
        attempts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(attempts)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
