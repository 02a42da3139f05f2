use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bson::{Bson, DateTime, doc};
use mongodb::Collection;
use mongodb::options::ReturnDocument;
use serde_json::json;

use models::{Exam, ExamAttempt};

use crate::error::{Error, is_duplicate_key};

/// Why the session gate refused question access. Always reported
/// synchronously with the specific bound or state that failed; never
/// retried by the server.
#[derive(Clone, Debug, PartialEq)]
pub enum GateRejection {
    NotStarted { starts_at: DateTime },
    Ended { ended_at: DateTime },
    AlreadyCompleted,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let body = match self {
            GateRejection::NotStarted { starts_at } => json!({
                "error": "Exam not started yet",
                "startsAt": rfc3339(starts_at),
            }),
            GateRejection::Ended { ended_at } => json!({
                "error": "Exam has ended",
                "endedAt": rfc3339(ended_at),
            }),
            GateRejection::AlreadyCompleted => json!({
                "error": "You have already completed this exam",
            }),
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

fn rfc3339(datetime: DateTime) -> String {
    datetime
        .try_to_rfc3339_string()
        .unwrap_or_else(|_| datetime.timestamp_millis().to_string())
}

/// The `[liveDate, deadDate]` window is the sole gate on question access
/// and is evaluated against wall-clock time at request time, never cached.
pub fn check_window(exam: &Exam, now: DateTime) -> Result<(), GateRejection> {
    if now < exam.live_date {
        return Err(GateRejection::NotStarted {
            starts_at: exam.live_date,
        });
    }
    if now > exam.dead_date {
        return Err(GateRejection::Ended {
            ended_at: exam.dead_date,
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptAccess {
    /// First authorized access created the attempt.
    Started,
    /// An open attempt already existed; the student continues.
    Resumed,
}

/// Admits a user to the question set, creating the attempt on first access.
/// Creation is an upsert under the unique (examId, userId) index, so two
/// concurrent first requests produce exactly one attempt; the loser of the
/// race is treated as already started.
pub async fn ensure_attempt(
    collection: &Collection<ExamAttempt>,
    exam_id: &str,
    user_id: &str,
    now: DateTime,
) -> Result<Result<AttemptAccess, GateRejection>, Error> {
    let filter = doc! {"examId": exam_id, "userId": user_id};

    if let Some(attempt) = collection.find_one(filter.clone()).await? {
        if attempt.completed_at.is_some() {
            return Ok(Err(GateRejection::AlreadyCompleted));
        }
        return Ok(Ok(AttemptAccess::Resumed));
    }

    let result = collection
        .update_one(
            filter,
            doc! {"$setOnInsert": {
                "examId": exam_id,
                "userId": user_id,
                "startedAt": now,
                "completedAt": Bson::Null,
            }},
        )
        .upsert(true)
        .await;

    match result {
        Ok(update) if update.upserted_id.is_some() => Ok(Ok(AttemptAccess::Started)),
        Ok(_) => Ok(Ok(AttemptAccess::Resumed)),
        Err(e) if is_duplicate_key(&e) => Ok(Ok(AttemptAccess::Resumed)),
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone, Debug)]
pub enum CompletionOutcome {
    Completed(Box<ExamAttempt>),
    AlreadyCompleted,
    NotFound,
}

/// Marks the attempt submitted. `completedAt` is written at most once: the
/// filter only matches an open attempt, so a repeat submission can never
/// move the recorded time.
pub async fn complete_attempt(
    collection: &Collection<ExamAttempt>,
    exam_id: &str,
    user_id: &str,
    now: DateTime,
) -> Result<CompletionOutcome, Error> {
    let updated = collection
        .find_one_and_update(
            doc! {"examId": exam_id, "userId": user_id, "completedAt": Bson::Null},
            doc! {"$set": {"completedAt": now}},
        )
        .return_document(ReturnDocument::After)
        .await?;

    if let Some(attempt) = updated {
        return Ok(CompletionOutcome::Completed(Box::new(attempt)));
    }

    match collection
        .find_one(doc! {"examId": exam_id, "userId": user_id})
        .await?
    {
        Some(_) => Ok(CompletionOutcome::AlreadyCompleted),
        None => Ok(CompletionOutcome::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam(live_ms: i64, dead_ms: i64) -> Exam {
        Exam {
            id: None,
            exam_id: "exam-1".to_string(),
            exam_name: "Algorithms Midterm".to_string(),
            total_questions: 10,
            duration: 60,
            live_date: DateTime::from_millis(live_ms),
            dead_date: DateTime::from_millis(dead_ms),
            exam_code: String::new(),
        }
    }

    #[test]
    fn window_admits_between_bounds() {
        let exam = exam(1_000, 5_000);
        assert_eq!(check_window(&exam, DateTime::from_millis(1_000)), Ok(()));
        assert_eq!(check_window(&exam, DateTime::from_millis(3_000)), Ok(()));
        assert_eq!(check_window(&exam, DateTime::from_millis(5_000)), Ok(()));
    }

    #[test]
    fn early_access_reports_the_start_bound() {
        let exam = exam(1_000, 5_000);
        let rejection = check_window(&exam, DateTime::from_millis(999)).unwrap_err();
        assert_eq!(
            rejection,
            GateRejection::NotStarted {
                starts_at: DateTime::from_millis(1_000)
            }
        );
    }

    #[test]
    fn late_access_reports_the_end_bound() {
        let exam = exam(1_000, 5_000);
        let rejection = check_window(&exam, DateTime::from_millis(5_001)).unwrap_err();
        assert_eq!(
            rejection,
            GateRejection::Ended {
                ended_at: DateTime::from_millis(5_000)
            }
        );
    }
}
