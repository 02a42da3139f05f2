use axum::http::StatusCode;
use bson::{DateTime, Document, doc};
use futures_util::TryStreamExt;
use mongodb::Collection;
use mongodb::options::ReturnDocument;
use serde::Deserialize;
use tracing::warn;

use models::{CheatingLog, Evidence, ViolationType};

use crate::error::{Error, is_duplicate_key};

/// Inbound violation report. Count fields arrive flattened alongside the
/// identity fields; anything unrecognized lands in `extra` and is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct SaveCheatingLogRequest {
    #[serde(rename = "examId", default)]
    pub exam_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    /// A single evidence object or an array of them.
    #[serde(default)]
    pub screenshots: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SaveCheatingLogRequest {
    pub fn has_identity(&self) -> bool {
        !self.exam_id.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.username.trim().is_empty()
    }
}

/// Picks out the known counter fields carrying integer values. Unknown and
/// non-numeric fields are dropped, not rejected.
pub fn increments(request: &SaveCheatingLogRequest) -> Document {
    let mut inc = Document::new();
    for kind in ViolationType::ALL {
        let field = kind.count_field();
        if let Some(value) = request.extra.get(field) {
            if let Some(n) = value.as_i64() {
                inc.insert(field, n);
            }
        }
    }
    inc
}

/// Normalizes the `screenshots` payload: absent means none, a lone object
/// means one, and malformed entries are dropped with a warning.
pub fn evidence_list(request: &SaveCheatingLogRequest) -> Vec<Evidence> {
    let values = match &request.screenshots {
        None | Some(serde_json::Value::Null) => return Vec::new(),
        Some(serde_json::Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Evidence>(value) {
            Ok(evidence) => Some(evidence),
            Err(e) => {
                warn!(error = ?e, "unable to deserialize screenshot entry");
                None
            }
        })
        .collect()
}

/// Merges one violation report into the per-(examId, email) aggregate as a
/// single atomic upsert: identity seeded on insert, counters incremented,
/// evidence appended in order. Concurrent reports for the same key cannot
/// lose increments to a read-modify-write race. Returns the post-update
/// document.
#[tracing::instrument(skip_all, fields(exam = %request.exam_id, email = %request.email))]
pub async fn record(
    collection: &Collection<CheatingLog>,
    request: &SaveCheatingLogRequest,
) -> Result<CheatingLog, Error> {
    match upsert(collection, request).await {
        Ok(log) => Ok(log),
        // Two first reports can race the insert; the loser retries once and
        // lands as a plain update.
        Err(Error::MongoDB(e)) if is_duplicate_key(&e) => upsert(collection, request).await,
        Err(e) => Err(e),
    }
}

async fn upsert(
    collection: &Collection<CheatingLog>,
    request: &SaveCheatingLogRequest,
) -> Result<CheatingLog, Error> {
    let inc = increments(request);
    let screenshots = evidence_list(request);

    let mut update = doc! {
        "$setOnInsert": {
            "examId": &request.exam_id,
            "email": &request.email,
            "username": &request.username,
            "createdAt": DateTime::now(),
        },
        "$currentDate": { "updatedAt": true },
    };
    if !inc.is_empty() {
        update.insert("$inc", inc);
    }
    if !screenshots.is_empty() {
        let entries = mongodb::bson::to_bson(&screenshots)?;
        update.insert("$push", doc! {"screenshots": {"$each": entries}});
    }

    let updated = collection
        .find_one_and_update(
            doc! {"examId": &request.exam_id, "email": &request.email},
            update,
        )
        .upsert(true)
        .return_document(ReturnDocument::After)
        .await?;

    updated.ok_or_else(|| {
        Error::Server(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upsert returned no document".to_string(),
        )
    })
}

/// All logs for an exam, most recently updated first.
pub async fn list_by_exam(
    collection: &Collection<CheatingLog>,
    exam_id: &str,
) -> Result<Vec<CheatingLog>, Error> {
    let logs = collection
        .find(doc! {"examId": exam_id})
        .sort(doc! {"updatedAt": -1, "_id": -1})
        .await?
        .try_collect()
        .await?;
    Ok(logs)
}

/// Derived analytics: total violations across every log of an exam.
/// A pure fold over the count fields, no stored state.
pub fn total_violations(logs: &[CheatingLog]) -> i64 {
    logs.iter().map(CheatingLog::total_violations).sum()
}
