//! Aggregator and session-gate behavior against a live MongoDB.
//! Each test namespaces its documents with fresh ObjectIds, so runs are
//! independent. Skipped when MONGODB_URI is not set.

use bson::{DateTime, doc, oid::ObjectId};
use models::db::{self, CHEATING_LOG_COLLECTION, EXAM_ATTEMPT_COLLECTION};
use models::{CheatingLog, ExamAttempt, ViolationType};
use violation_service::gate::{self, AttemptAccess, CompletionOutcome, GateRejection};
use violation_service::log::{self, SaveCheatingLogRequest};

async fn test_client() -> Option<mongodb::Client> {
    dotenvy::dotenv().ok();
    let Ok(uri) = std::env::var("MONGODB_URI") else {
        eprintln!("MONGODB_URI not set; skipping");
        return None;
    };
    let client = db::client(&uri).await.expect("unable to connect to MongoDB");
    db::ensure_indexes(&client)
        .await
        .expect("unable to create indexes");
    Some(client)
}

fn report(exam_id: &str, email: &str, body: serde_json::Value) -> SaveCheatingLogRequest {
    let mut merged = serde_json::json!({
        "examId": exam_id,
        "email": email,
        "username": "ada lovelace",
    });
    merged
        .as_object_mut()
        .unwrap()
        .extend(body.as_object().unwrap().clone());
    serde_json::from_value(merged).unwrap()
}

/// Three sequential single-increment reports must land as a count of three
/// on one document, leaving screenshots untouched.
#[tokio::test]
async fn sequential_increments_accumulate() {
    let Some(client) = test_client().await else {
        return;
    };
    let logs = db::get_collection::<CheatingLog>(&client, CHEATING_LOG_COLLECTION).await;

    let exam_id = ObjectId::new().to_hex();
    let email = format!("{}@test.local", ObjectId::new().to_hex());

    for _ in 0..3 {
        let request = report(&exam_id, &email, serde_json::json!({"tabSwitchCount": 1}));
        log::record(&logs, &request).await.unwrap();
    }

    let saved = logs
        .find_one(doc! {"examId": &exam_id, "email": &email})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.tab_switch_count, 3);
    assert_eq!(saved.count(ViolationType::TabSwitch), 3);
    assert!(saved.screenshots.is_empty());
    assert!(saved.created_at.is_some());
}

/// Concurrent reports with disjoint count fields must both land; the atomic
/// upsert cannot lose either increment.
#[tokio::test]
async fn concurrent_disjoint_increments_both_land() {
    let Some(client) = test_client().await else {
        return;
    };
    let logs = db::get_collection::<CheatingLog>(&client, CHEATING_LOG_COLLECTION).await;

    let exam_id = ObjectId::new().to_hex();
    let email = format!("{}@test.local", ObjectId::new().to_hex());

    let a = report(&exam_id, &email, serde_json::json!({"cellPhoneCount": 1}));
    let b = report(&exam_id, &email, serde_json::json!({"voiceDetectedCount": 2}));
    let (ra, rb) = tokio::join!(log::record(&logs, &a), log::record(&logs, &b));
    ra.unwrap();
    rb.unwrap();

    let saved = logs
        .find_one(doc! {"examId": &exam_id, "email": &email})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.cell_phone_count, 1);
    assert_eq!(saved.voice_detected_count, 2);
}

/// Evidence appends in order and never clears existing entries.
#[tokio::test]
async fn screenshots_append_in_order() {
    let Some(client) = test_client().await else {
        return;
    };
    let logs = db::get_collection::<CheatingLog>(&client, CHEATING_LOG_COLLECTION).await;

    let exam_id = ObjectId::new().to_hex();
    let email = format!("{}@test.local", ObjectId::new().to_hex());

    let first = report(
        &exam_id,
        &email,
        serde_json::json!({
            "cellPhoneCount": 1,
            "screenshots": {"url": "u1", "type": "cellPhone", "detectedAt": "2026-08-06T10:00:00Z"},
        }),
    );
    log::record(&logs, &first).await.unwrap();

    let second = report(
        &exam_id,
        &email,
        serde_json::json!({
            "screenshots": [
                {"url": "u2", "type": "noFace", "detectedAt": "2026-08-06T10:00:10Z"},
                {"url": "u3", "type": "noFace", "detectedAt": "2026-08-06T10:00:20Z"},
            ],
        }),
    );
    let saved = log::record(&logs, &second).await.unwrap();

    let urls: Vec<&str> = saved.screenshots.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2", "u3"]);
    assert_eq!(saved.cell_phone_count, 1);
}

/// Two concurrent first accesses produce exactly one attempt; a completed
/// attempt blocks any further access.
#[tokio::test]
async fn attempt_is_unique_and_completes_once() {
    let Some(client) = test_client().await else {
        return;
    };
    let attempts = db::get_collection::<ExamAttempt>(&client, EXAM_ATTEMPT_COLLECTION).await;

    let exam_id = ObjectId::new().to_hex();
    let user_id = ObjectId::new().to_hex();
    let now = DateTime::now();

    let (first, second) = tokio::join!(
        gate::ensure_attempt(&attempts, &exam_id, &user_id, now),
        gate::ensure_attempt(&attempts, &exam_id, &user_id, now),
    );
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();
    let started = [first, second]
        .iter()
        .filter(|a| **a == AttemptAccess::Started)
        .count();
    assert_eq!(started, 1);

    let stored = attempts
        .find(doc! {"examId": &exam_id, "userId": &user_id})
        .await
        .unwrap();
    let stored: Vec<ExamAttempt> = futures_util::TryStreamExt::try_collect(stored).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].completed_at.is_none());

    // Submission closes the attempt exactly once
    let outcome = gate::complete_attempt(&attempts, &exam_id, &user_id, DateTime::now())
        .await
        .unwrap();
    let CompletionOutcome::Completed(completed) = outcome else {
        panic!("first submission must complete the attempt");
    };
    let completed_at = completed.completed_at.expect("completedAt must be set");

    let outcome = gate::complete_attempt(&attempts, &exam_id, &user_id, DateTime::now())
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::AlreadyCompleted));

    // The recorded completion time never moves
    let stored = attempts
        .find_one(doc! {"examId": &exam_id, "userId": &user_id})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.completed_at, Some(completed_at));

    // And the gate now rejects the user
    let access = gate::ensure_attempt(&attempts, &exam_id, &user_id, DateTime::now())
        .await
        .unwrap();
    assert_eq!(access, Err(GateRejection::AlreadyCompleted));
}

/// Logs list newest-updated first.
#[tokio::test]
async fn listing_orders_by_most_recent_update() {
    let Some(client) = test_client().await else {
        return;
    };
    let logs = db::get_collection::<CheatingLog>(&client, CHEATING_LOG_COLLECTION).await;

    let exam_id = ObjectId::new().to_hex();
    let older = format!("{}@test.local", ObjectId::new().to_hex());
    let newer = format!("{}@test.local", ObjectId::new().to_hex());

    log::record(&logs, &report(&exam_id, &older, serde_json::json!({"noFaceCount": 1})))
        .await
        .unwrap();
    log::record(&logs, &report(&exam_id, &newer, serde_json::json!({"noFaceCount": 1})))
        .await
        .unwrap();
    // Touch the first document again so it becomes the most recent
    log::record(&logs, &report(&exam_id, &older, serde_json::json!({"noFaceCount": 1})))
        .await
        .unwrap();

    let listed = log::list_by_exam(&logs, &exam_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].email, older);
    assert_eq!(log::total_violations(&listed), 3);
}
