//! Persistence seam for quizzes, payments and attempts.
//!
//! Correctness under concurrency lives here, not in the services: implementations must
//! reject a second open payment slot and a second attempt for the same
//! `(quiz_id, identity_key)` with [`RepositoryError::Duplicate`], and apply the
//! transitions to success as single conditional writes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::payment::PaymentConfirmation;
use crate::models::{Attempt, Payment, PaymentStatus, Question, Quiz};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_quiz(&self, quiz_id: &str) -> RepositoryResult<Option<Quiz>>;

    async fn find_active_quiz_by_date(&self, date: NaiveDate) -> RepositoryResult<Option<Quiz>>;

    /// Questions ordered by position, answer key included.
    async fn list_questions(&self, quiz_id: &str) -> RepositoryResult<Vec<Question>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_payment(
        &self,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>>;

    async fn find_payment_by_id(
        &self,
        payment_id: &str,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>>;

    async fn find_payment_by_order(
        &self,
        order_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Payment>>;

    /// Fails with `Duplicate` if a pending or successful payment already holds the
    /// `(quiz_id, identity_key)` slot, or if the order id is reused.
    async fn insert_payment(&self, payment: &Payment) -> RepositoryResult<()>;

    /// `from` -> success for the given order and identity, only while the row carries no
    /// gateway payment id. Returns `None` when nothing matched, including when a
    /// concurrent call won the race. Promoting a `failed` row fails with `Duplicate` if
    /// another pending or successful payment holds the slot.
    async fn confirm_payment(
        &self,
        order_id: &str,
        identity_key: &str,
        from: PaymentStatus,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<Option<Payment>>;

    /// Stores a gateway capture on a `failed` row that has none, leaving it `failed`.
    async fn record_capture(
        &self,
        order_id: &str,
        identity_key: &str,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<bool>;

    /// pending -> failed, only if the payment was created before `created_before`.
    async fn expire_pending_payment(
        &self,
        payment_id: &str,
        created_before: DateTime<Utc>,
    ) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Fails with `Duplicate` if the identity already has an attempt for the quiz.
    async fn insert_attempt(&self, attempt: &Attempt) -> RepositoryResult<()>;

    async fn find_attempt(
        &self,
        quiz_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Attempt>>;

    /// Ordered by score desc, time spent asc, submission time asc.
    async fn top_attempts(&self, quiz_id: &str, limit: i64) -> RepositoryResult<Vec<Attempt>>;
}

#[async_trait]
pub trait Store: QuizRepository + PaymentRepository + AttemptRepository {
    /// Backend name reported by the health check
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> RepositoryResult<()>;
}
