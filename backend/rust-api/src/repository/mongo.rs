use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};

use super::{
    AttemptRepository, PaymentRepository, QuizRepository, RepositoryError, RepositoryResult,
    Store,
};
use crate::metrics::track_db_operation;
use crate::models::payment::PaymentConfirmation;
use crate::models::{Attempt, Payment, PaymentStatus, Question, Quiz};
use crate::utils::time::chrono_to_bson;

const QUIZZES: &str = "daily_quizzes";
const QUESTIONS: &str = "quiz_questions";
const PAYMENTS: &str = "payments";
const ATTEMPTS: &str = "quiz_attempts";

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn questions(&self) -> Collection<Question> {
        self.db.collection(QUESTIONS)
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection(PAYMENTS)
    }

    fn attempts(&self) -> Collection<Attempt> {
        self.db.collection(ATTEMPTS)
    }

    /// Creates the indexes the payment and attempt invariants rely on.
    /// The partial filter on `payments` uses `$in`, which needs MongoDB 6.0+.
    pub async fn ensure_indexes(&self) -> RepositoryResult<()> {
        self.quizzes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_date": 1, "is_active": 1 })
                    .build(),
            )
            .await?;

        self.questions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "question_order": 1 })
                    .build(),
            )
            .await?;

        // One open (pending or success) payment per quiz and identity
        self.payments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "identity_key": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("uniq_open_payment_per_identity".to_string())
                            .unique(true)
                            .partial_filter_expression(
                                doc! { "status": { "$in": ["pending", "success"] } },
                            )
                            .build(),
                    )
                    .build(),
            )
            .await?;

        self.payments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "order_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("uniq_order_id".to_string())
                            .unique(true)
                            .build(),
                    )
                    .build(),
            )
            .await?;

        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "identity_key": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("uniq_attempt_per_identity".to_string())
                            .unique(true)
                            .build(),
                    )
                    .build(),
            )
            .await?;

        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! {
                        "quiz_id": 1,
                        "score": -1,
                        "time_spent_seconds": 1,
                        "submitted_at": 1
                    })
                    .build(),
            )
            .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(ref ce) => ce.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn map_insert_error(err: mongodb::error::Error, what: &str) -> RepositoryError {
    if is_duplicate_key(&err) {
        RepositoryError::Duplicate(what.to_string())
    } else {
        RepositoryError::Database(err)
    }
}

#[async_trait]
impl QuizRepository for MongoStore {
    async fn find_quiz(&self, quiz_id: &str) -> RepositoryResult<Option<Quiz>> {
        let quiz = track_db_operation(
            "find_one",
            QUIZZES,
            async { self.quizzes().find_one(doc! { "_id": quiz_id }).await },
        )
        .await?;
        Ok(quiz)
    }

    async fn find_active_quiz_by_date(&self, date: NaiveDate) -> RepositoryResult<Option<Quiz>> {
        let quiz = track_db_operation(
            "find_one",
            QUIZZES,
            async {
                self.quizzes()
                    .find_one(doc! {
                        "quiz_date": date.format("%Y-%m-%d").to_string(),
                        "is_active": true
                    })
                    .await
            },
        )
        .await?;
        Ok(quiz)
    }

    async fn list_questions(&self, quiz_id: &str) -> RepositoryResult<Vec<Question>> {
        let questions = track_db_operation("find", QUESTIONS, async {
            self.questions()
                .find(doc! { "quiz_id": quiz_id })
                .sort(doc! { "question_order": 1 })
                .await?
                .try_collect::<Vec<_>>()
                .await
        })
        .await?;
        Ok(questions)
    }
}

#[async_trait]
impl PaymentRepository for MongoStore {
    async fn find_payment(
        &self,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>> {
        let payment = track_db_operation(
            "find_one",
            PAYMENTS,
            async {
                self.payments()
                    .find_one(doc! {
                        "quiz_id": quiz_id,
                        "identity_key": identity_key,
                        "status": status.as_str()
                    })
                    .await
            },
        )
        .await?;
        Ok(payment)
    }

    async fn find_payment_by_id(
        &self,
        payment_id: &str,
        quiz_id: &str,
        identity_key: &str,
        status: PaymentStatus,
    ) -> RepositoryResult<Option<Payment>> {
        let payment = track_db_operation(
            "find_one",
            PAYMENTS,
            async {
                self.payments()
                    .find_one(doc! {
                        "_id": payment_id,
                        "quiz_id": quiz_id,
                        "identity_key": identity_key,
                        "status": status.as_str()
                    })
                    .await
            },
        )
        .await?;
        Ok(payment)
    }

    async fn find_payment_by_order(
        &self,
        order_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Payment>> {
        let payment = track_db_operation(
            "find_one",
            PAYMENTS,
            async {
                self.payments()
                    .find_one(doc! {
                        "order_id": order_id,
                        "identity_key": identity_key
                    })
                    .await
            },
        )
        .await?;
        Ok(payment)
    }

    async fn insert_payment(&self, payment: &Payment) -> RepositoryResult<()> {
        track_db_operation("insert_one", PAYMENTS, async {
            self.payments().insert_one(payment).await
        })
            .await
            .map_err(|e| map_insert_error(e, "open payment for quiz and identity"))?;
        Ok(())
    }

    async fn confirm_payment(
        &self,
        order_id: &str,
        identity_key: &str,
        from: PaymentStatus,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<Option<Payment>> {
        let verified_at = chrono_to_bson(confirmation.verified_at);
        let mut set = doc! {
            "status": PaymentStatus::Success.as_str(),
            "gateway_payment_id": &confirmation.gateway_payment_id,
            "signature": &confirmation.signature,
            "verified_at": verified_at,
            "updated_at": verified_at,
        };

        // Contact details captured at issuance win over the ones sent with the callback
        if let Some(guest) = &confirmation.guest {
            let guest_doc = bson::to_document(guest)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            set.insert(
                "guest",
                doc! { "$ifNull": ["$guest", { "$literal": guest_doc }] },
            );
        }

        let pipeline: Vec<Document> = vec![doc! { "$set": set }];

        // A failed row moving to success re-enters the partial unique index
        let payment = track_db_operation(
            "find_one_and_update",
            PAYMENTS,
            async {
                self.payments()
                    .find_one_and_update(
                        doc! {
                            "order_id": order_id,
                            "identity_key": identity_key,
                            "status": from.as_str(),
                            "gateway_payment_id": null
                        },
                        pipeline,
                    )
                    .return_document(ReturnDocument::After)
                    .await
            },
        )
        .await
        .map_err(|e| map_insert_error(e, "open payment for quiz and identity"))?;
        Ok(payment)
    }

    async fn record_capture(
        &self,
        order_id: &str,
        identity_key: &str,
        confirmation: &PaymentConfirmation,
    ) -> RepositoryResult<bool> {
        let result = track_db_operation(
            "update_one",
            PAYMENTS,
            async {
                self.payments()
                    .update_one(
                        doc! {
                            "order_id": order_id,
                            "identity_key": identity_key,
                            "status": PaymentStatus::Failed.as_str(),
                            "gateway_payment_id": null
                        },
                        doc! {
                            "$set": {
                                "gateway_payment_id": &confirmation.gateway_payment_id,
                                "signature": &confirmation.signature,
                                "updated_at": chrono_to_bson(confirmation.verified_at)
                            }
                        },
                    )
                    .await
            },
        )
        .await?;
        Ok(result.modified_count == 1)
    }

    async fn expire_pending_payment(
        &self,
        payment_id: &str,
        created_before: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = track_db_operation(
            "update_one",
            PAYMENTS,
            async {
                self.payments()
                    .update_one(
                        doc! {
                            "_id": payment_id,
                            "status": PaymentStatus::Pending.as_str(),
                            "created_at": { "$lt": chrono_to_bson(created_before) }
                        },
                        doc! {
                            "$set": {
                                "status": PaymentStatus::Failed.as_str(),
                                "updated_at": chrono_to_bson(Utc::now())
                            }
                        },
                    )
                    .await
            },
        )
        .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl AttemptRepository for MongoStore {
    async fn insert_attempt(&self, attempt: &Attempt) -> RepositoryResult<()> {
        track_db_operation("insert_one", ATTEMPTS, async {
            self.attempts().insert_one(attempt).await
        })
            .await
            .map_err(|e| map_insert_error(e, "attempt for quiz and identity"))?;
        Ok(())
    }

    async fn find_attempt(
        &self,
        quiz_id: &str,
        identity_key: &str,
    ) -> RepositoryResult<Option<Attempt>> {
        let attempt = track_db_operation(
            "find_one",
            ATTEMPTS,
            async {
                self.attempts()
                    .find_one(doc! {
                        "quiz_id": quiz_id,
                        "identity_key": identity_key
                    })
                    .await
            },
        )
        .await?;
        Ok(attempt)
    }

    async fn top_attempts(&self, quiz_id: &str, limit: i64) -> RepositoryResult<Vec<Attempt>> {
        let attempts = track_db_operation("find", ATTEMPTS, async {
            self.attempts()
                .find(doc! {
                    "quiz_id": quiz_id,
                    "submitted_at": { "$ne": null }
                })
                .sort(doc! { "score": -1, "time_spent_seconds": 1, "submitted_at": 1 })
                .limit(limit)
                .await?
                .try_collect::<Vec<_>>()
                .await
        })
        .await?;
        Ok(attempts)
    }
}

#[async_trait]
impl Store for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
