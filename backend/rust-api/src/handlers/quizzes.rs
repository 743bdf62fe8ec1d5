use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use crate::error::{CoreError, CoreResult};
use crate::extractors::AppJson;
use crate::models::{
    Identity, LeaderboardResponse, Participation, QuizSummary, SubmitQuizRequest,
    SubmitQuizResponse,
};
use crate::services::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsQuery {
    pub payment_id: Option<String>,
}

/// GET /api/v1/quizzes/today
pub async fn get_today_quiz(State(state): State<Arc<AppState>>) -> CoreResult<Json<QuizSummary>> {
    let quiz = state.quiz_service().get_today_quiz(Utc::now()).await?;
    Ok(Json(quiz))
}

/// GET /api/v1/quizzes/{id}/participation
pub async fn get_participation(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    identity: Identity,
) -> CoreResult<Json<Participation>> {
    let participation = state
        .quiz_service()
        .get_participation(&quiz_id, &identity)
        .await?;
    Ok(Json(participation))
}

/// GET /api/v1/quizzes/{id}/questions?paymentId=
pub async fn get_questions(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    Query(query): Query<QuestionsQuery>,
    identity: Identity,
) -> CoreResult<Json<Value>> {
    let payment_id = query
        .payment_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| CoreError::Validation("paymentId is required".to_string()))?;

    let questions = state
        .quiz_service()
        .get_questions(&quiz_id, &payment_id, &identity)
        .await?;

    Ok(Json(json!({
        "quizId": quiz_id,
        "totalQuestions": questions.len(),
        "questions": questions,
    })))
}

/// POST /api/v1/quizzes/{id}/submit
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    identity: Identity,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> CoreResult<Json<SubmitQuizResponse>> {
    req.validate()?;

    let response = state
        .attempt_service()
        .submit_quiz(
            &quiz_id,
            &req.payment_id,
            &req.answers,
            req.time_spent_seconds,
            &identity,
        )
        .await?;

    Ok(Json(response))
}

/// GET /api/v1/quizzes/{id}/leaderboard
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> CoreResult<Json<LeaderboardResponse>> {
    let leaderboard = state
        .leaderboard_service()
        .get_leaderboard(&quiz_id, Utc::now())
        .await?;
    Ok(Json(leaderboard))
}
