#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use dailyquiz_api::{
    config::{Config, GatewaySettings, QuizSettings},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{AnswerOption, Question, Quiz},
    repository::MemoryStore,
    services::{
        gateway::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway},
        signature::sign_checkout,
        AppState,
    },
    utils::time::civil_date,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const KEY_ID: &str = "rzp_test_key";
pub const KEY_SECRET: &str = "test_key_secret";
pub const METRICS_AUTH: &str = "metrics:test-secret";

/// Active quiz dated today (IST)
pub const TODAY_QUIZ: &str = "quiz-today";
/// Quiz whose results were published long ago
pub const ARCHIVE_QUIZ: &str = "quiz-archive";
/// Quiz whose results are not published yet
pub const FUTURE_QUIZ: &str = "quiz-future";
pub const INACTIVE_QUIZ: &str = "quiz-inactive";

pub const ENTRY_FEE: f64 = 49.0;
pub const QUESTION_COUNT: usize = 10;

/// Scripted payment gateway: hands out sequential order ids and records every call.
#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicU32,
    fail: AtomicBool,
    pub calls: Mutex<Vec<GatewayOrderRequest>>,
}

impl FakeGateway {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<GatewayOrderRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        KEY_ID
    }

    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 500,
                body: "gateway down".to_string(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_test_{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
}

/// How a test request identifies its caller
#[derive(Clone)]
pub enum Caller {
    User(String),
    Guest(String),
    Anonymous,
}

impl Caller {
    pub fn user(id: &str, name: &str) -> Self {
        Caller::User(user_token(id, Some(name)))
    }

    pub fn guest(fingerprint: &str) -> Self {
        Caller::Guest(fingerprint.to_string())
    }
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://unused".to_string(),
        mongo_database: "dailyquiz_test".to_string(),
        redis_uri: None,
        jwt_secret: JWT_SECRET.to_string(),
        metrics_auth: METRICS_AUTH.to_string(),
        gateway: GatewaySettings {
            key_id: KEY_ID.to_string(),
            key_secret: KEY_SECRET.to_string(),
            api_base: "http://gateway.invalid".to_string(),
            currency: "INR".to_string(),
            timeout_seconds: 5,
            pending_order_ttl_seconds: 900,
        },
        quiz: QuizSettings::default(),
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(FakeGateway::default());
    seed_test_data(&store);

    let state = AppState::from_parts(config, store.clone(), gateway.clone(), None);

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        gateway,
    }
}

fn quiz(id: &str, quiz_date: NaiveDate, is_active: bool) -> Quiz {
    Quiz {
        id: id.to_string(),
        quiz_date,
        title: format!("Daily Quiz {}", quiz_date),
        description: Some("General knowledge".to_string()),
        entry_fee: ENTRY_FEE,
        prize_pool: 5000.0,
        results_time: "21:00".to_string(),
        is_active,
        created_at: Utc::now(),
    }
}

pub fn correct_option(position: usize) -> AnswerOption {
    [AnswerOption::A, AnswerOption::B, AnswerOption::C, AnswerOption::D][position % 4]
}

pub fn wrong_option(position: usize) -> AnswerOption {
    correct_option(position + 1)
}

pub fn question_id(quiz_id: &str, position: usize) -> String {
    format!("{}-q{}", quiz_id, position + 1)
}

fn seed_test_data(store: &MemoryStore) {
    let today = civil_date(Utc::now(), dailyquiz_api::config::IST_OFFSET_MINUTES)
        .expect("valid offset");

    let quizzes = [
        quiz(TODAY_QUIZ, today, true),
        quiz(
            ARCHIVE_QUIZ,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            true,
        ),
        quiz(FUTURE_QUIZ, today + Duration::days(30), true),
        quiz(INACTIVE_QUIZ, today - Duration::days(1), false),
    ];

    for quiz in quizzes {
        let quiz_id = quiz.id.clone();
        store.insert_quiz(quiz);
        store.insert_questions((0..QUESTION_COUNT).map(|position| Question {
            id: question_id(&quiz_id, position),
            quiz_id: quiz_id.clone(),
            question_order: position as i32 + 1,
            question_text: format!("Question {}", position + 1),
            option_a: "Option A".to_string(),
            option_b: "Option B".to_string(),
            option_c: "Option C".to_string(),
            option_d: "Option D".to_string(),
            correct_option: correct_option(position),
            category: Some("general".to_string()),
        }));
    }
}

pub fn user_token(sub: &str, name: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    JwtService::new(JWT_SECRET)
        .generate_token(&JwtClaims {
            sub: sub.to_string(),
            name: name.map(str::to_string),
            exp: (now + 3600) as usize,
            iat: now as usize,
        })
        .unwrap()
}

pub fn sign(order_id: &str, payment_id: &str) -> String {
    sign_checkout(KEY_SECRET, order_id, payment_id)
}

pub fn guest_contact(name: &str) -> Value {
    json!({
        "name": name,
        "email": "guest@example.com",
        "phone": "+919876543210"
    })
}

/// Answers that get exactly `correct` of the seeded questions right
pub fn answers_with_score(quiz_id: &str, correct: usize) -> Value {
    let mut answers = serde_json::Map::new();
    for position in 0..QUESTION_COUNT {
        let option = if position < correct {
            correct_option(position)
        } else {
            wrong_option(position)
        };
        answers.insert(question_id(quiz_id, position), json!(option.as_str()));
    }
    Value::Object(answers)
}

fn with_caller(
    builder: axum::http::request::Builder,
    caller: &Caller,
) -> axum::http::request::Builder {
    match caller {
        Caller::User(token) => builder.header("authorization", format!("Bearer {}", token)),
        Caller::Guest(fingerprint) => builder.header("x-device-fingerprint", fingerprint),
        Caller::Anonymous => builder,
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).to_string()))
    };
    (status, json)
}

pub async fn get(app: &TestApp, uri: &str, caller: &Caller) -> (StatusCode, Value) {
    let request = with_caller(Request::builder().method("GET").uri(uri), caller)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value, caller: &Caller) -> (StatusCode, Value) {
    let request = with_caller(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json"),
        caller,
    )
    .body(Body::from(body.to_string()))
    .unwrap();
    send(app, request).await
}

pub async fn create_order(app: &TestApp, quiz_id: &str, caller: &Caller) -> (StatusCode, Value) {
    let body = match caller {
        Caller::Guest(_) => json!({ "quizId": quiz_id, "guest": guest_contact("Guest Player") }),
        _ => json!({ "quizId": quiz_id }),
    };
    post_json(app, "/api/v1/payments/orders", body, caller).await
}

pub async fn verify(
    app: &TestApp,
    order_id: &str,
    gateway_payment_id: &str,
    caller: &Caller,
) -> (StatusCode, Value) {
    post_json(
        app,
        "/api/v1/payments/verify",
        json!({
            "orderId": order_id,
            "paymentId": gateway_payment_id,
            "signature": sign(order_id, gateway_payment_id),
        }),
        caller,
    )
    .await
}

/// Runs order creation and verification; returns the payment record id
pub async fn pay(app: &TestApp, quiz_id: &str, caller: &Caller) -> String {
    let (status, order) = create_order(app, quiz_id, caller).await;
    assert_eq!(status, StatusCode::CREATED, "order failed: {}", order);

    let order_id = order["orderId"].as_str().unwrap().to_string();
    let gateway_payment_id = format!("pay_{}", order_id);
    let (status, verified) = verify(app, &order_id, &gateway_payment_id, caller).await;
    assert_eq!(status, StatusCode::OK, "verify failed: {}", verified);

    order["paymentId"].as_str().unwrap().to_string()
}

pub async fn submit(
    app: &TestApp,
    quiz_id: &str,
    payment_id: &str,
    answers: Value,
    time_spent_seconds: f64,
    caller: &Caller,
) -> (StatusCode, Value) {
    post_json(
        app,
        &format!("/api/v1/quizzes/{}/submit", quiz_id),
        json!({
            "paymentId": payment_id,
            "answers": answers,
            "timeSpentSeconds": time_spent_seconds,
        }),
        caller,
    )
    .await
}
