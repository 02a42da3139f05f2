use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use models::{Evidence, ViolationType};

/// Who this session reports for; seeded into every upsert.
#[derive(Clone, Debug)]
pub struct Identity {
    pub exam_id: String,
    pub email: String,
    pub username: String,
}

/// Counts and evidence accumulated since the last successful delivery.
/// Holding only the unreported remainder keeps the periodic autosave from
/// re-incrementing what a per-event save already landed.
#[derive(Debug, Default)]
pub struct PendingLog {
    counts: HashMap<ViolationType, i64>,
    screenshots: Vec<Evidence>,
}

impl PendingLog {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.screenshots.is_empty()
    }

    pub fn note(&mut self, kind: ViolationType, evidence: Option<Evidence>) {
        *self.counts.entry(kind).or_insert(0) += 1;
        if let Some(evidence) = evidence {
            self.screenshots.push(evidence);
        }
    }

    pub fn count(&self, kind: ViolationType) -> i64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn take(&mut self) -> PendingLog {
        std::mem::take(self)
    }

    /// Folds a failed delivery back in. The failed batch is older than
    /// anything noted since, so its evidence goes back to the front.
    pub fn merge(&mut self, older: PendingLog) {
        for (kind, count) in older.counts {
            *self.counts.entry(kind).or_insert(0) += count;
        }
        let mut screenshots = older.screenshots;
        screenshots.append(&mut self.screenshots);
        self.screenshots = screenshots;
    }

    fn body<'a>(&'a self, identity: &'a Identity) -> ReportBody<'a> {
        ReportBody {
            exam_id: &identity.exam_id,
            email: &identity.email,
            username: &identity.username,
            counts: self
                .counts
                .iter()
                .map(|(kind, count)| (kind.count_field(), *count))
                .collect(),
            screenshots: &self.screenshots,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportBody<'a> {
    #[serde(rename = "examId")]
    exam_id: &'a str,
    email: &'a str,
    username: &'a str,
    #[serde(flatten)]
    counts: HashMap<&'static str, i64>,
    #[serde(skip_serializing_if = "no_screenshots")]
    screenshots: &'a [Evidence],
}

fn no_screenshots(screenshots: &&[Evidence]) -> bool {
    screenshots.is_empty()
}

/// How a delivery attempt ended. Failures are swallowed by design, but
/// surfaced here so callers and tests can still observe them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    NothingToSend,
    FailedIgnored,
}

/// Best-effort client of the aggregation service. Every qualifying event
/// notes a delta of one; `flush` posts the unreported remainder and merges
/// it back on failure so the next autosave resynchronizes.
pub struct Reporter {
    client: reqwest::Client,
    endpoint: String,
    identity: Identity,
    pending: Mutex<PendingLog>,
}

impl Reporter {
    pub fn new(api_base_url: &str, identity: Identity) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/cheatingLogs", api_base_url.trim_end_matches('/')),
            identity,
            pending: Mutex::new(PendingLog::default()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingLog> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn note_event(&self, kind: ViolationType, evidence: Option<Evidence>) {
        self.pending().note(kind, evidence);
    }

    /// Unreported count for one type; what the next flush would deliver.
    pub fn pending_count(&self, kind: ViolationType) -> i64 {
        self.pending().count(kind)
    }

    /// Posts the unreported remainder. A transient network failure is
    /// logged and the batch folded back for the next flush; it never
    /// surfaces to the detection loops.
    pub async fn flush(&self) -> ReportOutcome {
        let taken = self.pending().take();
        if taken.is_empty() {
            return ReportOutcome::NothingToSend;
        }

        let request = self
            .client
            .post(&self.endpoint)
            .json(&taken.body(&self.identity));

        match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => {
                debug!("violation report delivered");
                ReportOutcome::Delivered
            }
            Err(e) => {
                warn!(error = %e, "violation report failed; retained for autosave");
                self.pending().merge(taken);
                ReportOutcome::FailedIgnored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            exam_id: "exam-1".to_string(),
            email: "ada@test.local".to_string(),
            username: "ada".to_string(),
        }
    }

    fn evidence(url: &str) -> Evidence {
        Evidence {
            url: url.to_string(),
            kind: ViolationType::CellPhone,
            detected_at: bson::DateTime::now(),
            confidence: None,
        }
    }

    #[test]
    fn notes_accumulate_per_type() {
        let mut pending = PendingLog::default();
        pending.note(ViolationType::TabSwitch, None);
        pending.note(ViolationType::TabSwitch, None);
        pending.note(ViolationType::CellPhone, Some(evidence("u1")));
        assert_eq!(pending.count(ViolationType::TabSwitch), 2);
        assert_eq!(pending.count(ViolationType::CellPhone), 1);
        assert!(!pending.is_empty());
    }

    #[test]
    fn merge_preserves_counts_and_evidence_order() {
        let mut pending = PendingLog::default();
        pending.note(ViolationType::CellPhone, Some(evidence("old")));
        let taken = pending.take();
        assert!(pending.is_empty());

        pending.note(ViolationType::CellPhone, Some(evidence("new")));
        pending.merge(taken);
        assert_eq!(pending.count(ViolationType::CellPhone), 2);
        let urls: Vec<&str> = pending.screenshots.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["old", "new"]);
    }

    #[test]
    fn body_uses_document_field_names() {
        let mut pending = PendingLog::default();
        pending.note(ViolationType::AttentionDrift, None);
        let body = serde_json::to_value(pending.body(&identity())).unwrap();
        assert_eq!(body["examId"], "exam-1");
        assert_eq!(body["attentionDriftCount"], 1);
        assert!(body.get("screenshots").is_none());
    }

    #[tokio::test]
    async fn empty_flush_sends_nothing() {
        let reporter = Reporter::new("http://127.0.0.1:9", identity());
        assert_eq!(reporter.flush().await, ReportOutcome::NothingToSend);
    }

    /// The failure is suppressed, observable, and nothing is lost.
    #[tokio::test]
    async fn failed_flush_retains_the_batch() {
        let reporter = Reporter::new("http://127.0.0.1:9", identity());
        reporter.note_event(ViolationType::TabSwitch, None);
        reporter.note_event(ViolationType::TabSwitch, None);

        assert_eq!(reporter.flush().await, ReportOutcome::FailedIgnored);
        assert_eq!(reporter.pending_count(ViolationType::TabSwitch), 2);
    }
}
