use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bson::{DateTime, doc};
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use models::db::{
    CHEATING_LOG_COLLECTION, EXAM_ATTEMPT_COLLECTION, EXAM_COLLECTION, QUESTION_COLLECTION,
    get_collection,
};
use models::{CheatingLog, Exam, ExamAttempt, Question};

use crate::config::AppState;
use crate::error::Error;
use crate::gate::{self, CompletionOutcome};
use crate::log::{self, SaveCheatingLogRequest};

pub async fn get_status_ping() -> impl IntoResponse {
    info!("Status");
    StatusCode::OK
}

/// Upserts one violation report into the per-(examId, email) aggregate.
pub async fn post_cheating_log(
    State(state): State<AppState>,
    Json(request): Json<SaveCheatingLogRequest>,
) -> Result<Response, Error> {
    if !request.has_identity() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "examId, email, username are required",
            })),
        )
            .into_response());
    }

    let collection = get_collection::<CheatingLog>(&state.client, CHEATING_LOG_COLLECTION).await;
    let saved = log::record(&collection, &request).await?;

    Ok((StatusCode::OK, Json(json!({"success": true, "data": saved}))).into_response())
}

pub async fn get_cheating_logs(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Response, Error> {
    let collection = get_collection::<CheatingLog>(&state.client, CHEATING_LOG_COLLECTION).await;
    let logs = log::list_by_exam(&collection, &exam_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({"success": true, "count": logs.len(), "data": logs})),
    )
        .into_response())
}

pub async fn get_detailed_cheating_logs(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Response, Error> {
    let collection = get_collection::<CheatingLog>(&state.client, CHEATING_LOG_COLLECTION).await;
    let logs = log::list_by_exam(&collection, &exam_id).await?;
    let total_violations = log::total_violations(&logs);

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "logs": logs,
                "analytics": {
                    "totalLogs": logs.len(),
                    "totalViolations": total_violations,
                },
            },
        })),
    )
        .into_response())
}

fn user_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The session gate: enforces the exam window and one-attempt semantics,
/// then returns the question list. First authorized access creates the
/// attempt; an open attempt resumes.
pub async fn get_questions(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let Some(user_id) = user_id_from(&headers) else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "x-user-id header required"})),
        )
            .into_response());
    };
    let exam_id = exam_id.trim().to_string();

    let exams = get_collection::<Exam>(&state.client, EXAM_COLLECTION).await;
    let Some(exam) = exams.find_one(doc! {"examId": &exam_id}).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Exam not found"})),
        )
            .into_response());
    };

    let now = DateTime::now();
    if let Err(rejection) = gate::check_window(&exam, now) {
        return Ok(rejection.into_response());
    }

    let attempts = get_collection::<ExamAttempt>(&state.client, EXAM_ATTEMPT_COLLECTION).await;
    match gate::ensure_attempt(&attempts, &exam_id, &user_id, now).await? {
        Err(rejection) => return Ok(rejection.into_response()),
        Ok(access) => {
            info!(exam = %exam_id, user = %user_id, ?access, "question access granted");
        }
    }

    let questions = get_collection::<Question>(&state.client, QUESTION_COLLECTION).await;
    let questions: Vec<Question> = questions
        .find(doc! {"examId": &exam_id})
        .await?
        .try_collect()
        .await?;

    Ok((StatusCode::OK, Json(questions)).into_response())
}

/// Submission: sets `completedAt` exactly once and closes the attempt.
pub async fn post_submit(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let Some(user_id) = user_id_from(&headers) else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "x-user-id header required"})),
        )
            .into_response());
    };

    let attempts = get_collection::<ExamAttempt>(&state.client, EXAM_ATTEMPT_COLLECTION).await;
    let outcome =
        gate::complete_attempt(&attempts, exam_id.trim(), &user_id, DateTime::now()).await?;

    let response = match outcome {
        CompletionOutcome::Completed(attempt) => (
            StatusCode::OK,
            Json(json!({"success": true, "data": attempt})),
        )
            .into_response(),
        CompletionOutcome::AlreadyCompleted => (
            StatusCode::CONFLICT,
            Json(json!({"error": "You have already completed this exam"})),
        )
            .into_response(),
        CompletionOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Attempt not found"})),
        )
            .into_response(),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(rename = "examCode", default)]
    pub exam_code: String,
}

/// Exact, case-sensitive code check. An exam with no stored code is public.
pub async fn post_verify_code(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Response, Error> {
    let exams = get_collection::<Exam>(&state.client, EXAM_COLLECTION).await;
    let Some(exam) = exams.find_one(doc! {"examId": exam_id.trim()}).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Exam not found"})),
        )
            .into_response());
    };

    let response = if exam.exam_code.is_empty() || exam.exam_code == request.exam_code {
        (
            StatusCode::OK,
            Json(json!({"valid": true, "message": "Access granted"})),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"valid": false, "message": "Invalid exam code"})),
        )
            .into_response()
    };
    Ok(response)
}
