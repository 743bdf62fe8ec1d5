use axum::http::StatusCode;
use chrono::{Duration, Utc};
use dailyquiz_api::models::{Payment, PaymentStatus};
use dailyquiz_api::repository::PaymentRepository;
use serde_json::json;

mod common;

use common::{question_id, Caller, ARCHIVE_QUIZ, TODAY_QUIZ};

#[tokio::test]
async fn test_submit_with_pending_payment_requires_payment() {
    let app = common::create_test_app();
    let caller = Caller::user("u-pending", "Asha");

    let (_, order) = common::create_order(&app, TODAY_QUIZ, &caller).await;
    let payment_id = order["paymentId"].as_str().unwrap();

    let (status, body) = common::submit(
        &app,
        TODAY_QUIZ,
        payment_id,
        common::answers_with_score(TODAY_QUIZ, 10),
        60.0,
        &caller,
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "payment_required");
    assert!(app.store.attempts_for(TODAY_QUIZ).is_empty());
}

#[tokio::test]
async fn test_submit_with_unknown_or_foreign_payment_requires_payment() {
    let app = common::create_test_app();
    let owner = Caller::user("u-payer", "Payer");
    let other = Caller::user("u-freeloader", "Freeloader");
    let payment_id = common::pay(&app, TODAY_QUIZ, &owner).await;

    // Someone else's payment
    let (status, _) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 10),
        60.0,
        &other,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    // The owner's payment used for a different quiz
    let (status, _) = common::submit(
        &app,
        ARCHIVE_QUIZ,
        &payment_id,
        common::answers_with_score(ARCHIVE_QUIZ, 10),
        60.0,
        &owner,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    // Made-up id
    let (status, _) = common::submit(
        &app,
        TODAY_QUIZ,
        "not-a-payment",
        common::answers_with_score(TODAY_QUIZ, 10),
        60.0,
        &owner,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_score_is_recomputed_on_the_server() {
    let app = common::create_test_app();
    let caller = Caller::user("u-score", "Ravi");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    // Answer key for the first three questions is A, B, C
    let answers = json!({
        question_id(TODAY_QUIZ, 0): "A",
        question_id(TODAY_QUIZ, 1): "C",
        question_id(TODAY_QUIZ, 2): "C",
    });

    let (status, body) = common::post_json(
        &app,
        &format!("/api/v1/quizzes/{}/submit", TODAY_QUIZ),
        json!({
            "paymentId": payment_id,
            "answers": answers,
            "timeSpentSeconds": 42,
            "score": 10
        }),
        &caller,
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["score"], 2);
    assert_eq!(body["totalQuestions"], 10);
    assert_eq!(body["attempt"]["timeSpentSeconds"], 42);
    assert_eq!(body["attempt"]["answers"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_answer_entries_are_dropped() {
    let app = common::create_test_app();
    let caller = Caller::user("u-garbage", "Meera");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let answers = json!({
        question_id(TODAY_QUIZ, 0): "a",
        question_id(TODAY_QUIZ, 1): 2,
        question_id(TODAY_QUIZ, 2): "E",
        "unknown-question": "A",
    });

    let (status, body) =
        common::submit(&app, TODAY_QUIZ, &payment_id, answers, 30.0, &caller).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["score"], 0);
    assert!(body["attempt"]["answers"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_object_answers_are_rejected() {
    let app = common::create_test_app();
    let caller = Caller::user("u-array", "Kiran");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let (status, body) =
        common::submit(&app, TODAY_QUIZ, &payment_id, json!(["A", "B"]), 30.0, &caller).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_answers_format");
    assert!(app.store.attempts_for(TODAY_QUIZ).is_empty());
}

#[tokio::test]
async fn test_elapsed_time_is_clamped() {
    let app = common::create_test_app();

    let fast = Caller::user("u-negative", "Fast");
    let payment_id = common::pay(&app, TODAY_QUIZ, &fast).await;
    let (status, body) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 5),
        -5.0,
        &fast,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempt"]["timeSpentSeconds"], 0);

    let slow = Caller::user("u-huge", "Slow");
    let payment_id = common::pay(&app, TODAY_QUIZ, &slow).await;
    let (status, body) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 5),
        999_999.0,
        &slow,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempt"]["timeSpentSeconds"], 86_400);
}

#[tokio::test]
async fn test_second_submission_is_rejected() {
    let app = common::create_test_app();
    let caller = Caller::user("u-dup", "Tara");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let (status, _) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 3),
        100.0,
        &caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 10),
        10.0,
        &caller,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_submitted");

    let attempts = app.store.attempts_for(TODAY_QUIZ);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score, 3);
}

#[tokio::test]
async fn test_guest_attempt_uses_contact_name() {
    let app = common::create_test_app();
    let caller = Caller::guest("device-guest-0042");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let (status, _) = common::submit(
        &app,
        TODAY_QUIZ,
        &payment_id,
        common::answers_with_score(TODAY_QUIZ, 4),
        75.0,
        &caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let attempts = app.store.attempts_for(TODAY_QUIZ);
    assert_eq!(attempts[0].identity_key, "device:device-guest-0042");
    assert_eq!(attempts[0].display_name.as_deref(), Some("Guest Player"));
}

#[tokio::test]
async fn test_submit_with_failed_payment_requires_payment() {
    let app = common::create_test_app();
    let caller = Caller::user("u-failed", "Nila");
    let created = Utc::now() - Duration::hours(2);

    app.store
        .insert_payment(&Payment {
            id: "failed-payment".to_string(),
            quiz_id: TODAY_QUIZ.to_string(),
            identity_key: "user:u-failed".to_string(),
            user_id: Some("u-failed".to_string()),
            device_fingerprint: None,
            is_anonymous: false,
            guest: None,
            order_id: "order_failed".to_string(),
            gateway_payment_id: None,
            signature: None,
            amount: common::ENTRY_FEE,
            amount_minor: 4900,
            currency: "INR".to_string(),
            status: PaymentStatus::Failed,
            created_at: created,
            updated_at: created,
            verified_at: None,
        })
        .await
        .unwrap();

    let (status, body) = common::submit(
        &app,
        TODAY_QUIZ,
        "failed-payment",
        common::answers_with_score(TODAY_QUIZ, 10),
        60.0,
        &caller,
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "payment_required");
    assert!(app.store.attempts_for(TODAY_QUIZ).is_empty());
}

#[tokio::test]
async fn test_concurrent_submissions_record_one_attempt() {
    let app = common::create_test_app();
    let caller = Caller::user("u-double-submit", "Twice");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let ((first, _), (second, _)) = tokio::join!(
        common::submit(
            &app,
            TODAY_QUIZ,
            &payment_id,
            common::answers_with_score(TODAY_QUIZ, 6),
            80.0,
            &caller,
        ),
        common::submit(
            &app,
            TODAY_QUIZ,
            &payment_id,
            common::answers_with_score(TODAY_QUIZ, 9),
            40.0,
            &caller,
        ),
    );

    let mut statuses = vec![first, second];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
    assert_eq!(app.store.attempts_for(TODAY_QUIZ).len(), 1);
}

#[tokio::test]
async fn test_missing_answers_is_an_answers_format_error() {
    let app = common::create_test_app();
    let caller = Caller::user("u-no-answers", "Empty");
    let payment_id = common::pay(&app, TODAY_QUIZ, &caller).await;

    let (status, body) = common::post_json(
        &app,
        &format!("/api/v1/quizzes/{}/submit", TODAY_QUIZ),
        json!({ "paymentId": payment_id, "timeSpentSeconds": 30 }),
        &caller,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_answers_format");
}
