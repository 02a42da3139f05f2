//! Proctoring Data Model
//!
//! Shared document types for the exam proctoring collections:
//!
//! - `CheatingLog` - per-(exam, email) violation aggregate
//! - `ExamAttempt` - one permitted engagement per (exam, user)
//! - `Exam` / `Question` - exam metadata and question bank (read-only here)
//!
pub mod db;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Closed set of integrity violations. Camera-sourced kinds come from the
/// detection pipeline, browser-sourced kinds from the event monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationType {
    NoFace,
    MultipleFace,
    CellPhone,
    ProhibitedObject,
    VoiceDetected,
    AttentionDrift,
    TabSwitch,
    CopyPaste,
    RightClick,
    PrintScreen,
    DevTools,
    FullScreenExit,
    WindowBlur,
    ApplicationSwitch,
}

impl ViolationType {
    pub const ALL: [ViolationType; 14] = [
        ViolationType::NoFace,
        ViolationType::MultipleFace,
        ViolationType::CellPhone,
        ViolationType::ProhibitedObject,
        ViolationType::VoiceDetected,
        ViolationType::AttentionDrift,
        ViolationType::TabSwitch,
        ViolationType::CopyPaste,
        ViolationType::RightClick,
        ViolationType::PrintScreen,
        ViolationType::DevTools,
        ViolationType::FullScreenExit,
        ViolationType::WindowBlur,
        ViolationType::ApplicationSwitch,
    ];

    /// Name of the counter field on the `CheatingLog` document.
    pub fn count_field(self) -> &'static str {
        match self {
            ViolationType::NoFace => "noFaceCount",
            ViolationType::MultipleFace => "multipleFaceCount",
            ViolationType::CellPhone => "cellPhoneCount",
            ViolationType::ProhibitedObject => "prohibitedObjectCount",
            ViolationType::VoiceDetected => "voiceDetectedCount",
            ViolationType::AttentionDrift => "attentionDriftCount",
            ViolationType::TabSwitch => "tabSwitchCount",
            ViolationType::CopyPaste => "copyPasteCount",
            ViolationType::RightClick => "rightClickCount",
            ViolationType::PrintScreen => "printScreenCount",
            ViolationType::DevTools => "devToolsCount",
            ViolationType::FullScreenExit => "fullScreenExitCount",
            ViolationType::WindowBlur => "windowBlurCount",
            ViolationType::ApplicationSwitch => "applicationSwitchCount",
        }
    }
}

/// Captured screenshot (or inline data URL) attached to a violation.
/// The `url` is opaque to this system and passed through unchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ViolationType,
    #[serde(
        rename = "detectedAt",
        with = "bson::serde_helpers::bson_datetime_as_rfc3339_string"
    )]
    pub detected_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Durable violation aggregate, exactly one document per (examId, email).
/// Counts only ever grow; `screenshots` is append-only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheatingLog {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub exam_id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub no_face_count: i64,
    #[serde(default)]
    pub multiple_face_count: i64,
    #[serde(default)]
    pub cell_phone_count: i64,
    #[serde(default)]
    pub prohibited_object_count: i64,
    #[serde(default)]
    pub voice_detected_count: i64,
    #[serde(default)]
    pub attention_drift_count: i64,
    #[serde(default)]
    pub tab_switch_count: i64,
    #[serde(default)]
    pub copy_paste_count: i64,
    #[serde(default)]
    pub right_click_count: i64,
    #[serde(default)]
    pub print_screen_count: i64,
    #[serde(default)]
    pub dev_tools_count: i64,
    #[serde(default)]
    pub full_screen_exit_count: i64,
    #[serde(default)]
    pub window_blur_count: i64,
    #[serde(default)]
    pub application_switch_count: i64,
    #[serde(default)]
    pub screenshots: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<bson::DateTime>,
}

impl CheatingLog {
    pub fn count(&self, kind: ViolationType) -> i64 {
        match kind {
            ViolationType::NoFace => self.no_face_count,
            ViolationType::MultipleFace => self.multiple_face_count,
            ViolationType::CellPhone => self.cell_phone_count,
            ViolationType::ProhibitedObject => self.prohibited_object_count,
            ViolationType::VoiceDetected => self.voice_detected_count,
            ViolationType::AttentionDrift => self.attention_drift_count,
            ViolationType::TabSwitch => self.tab_switch_count,
            ViolationType::CopyPaste => self.copy_paste_count,
            ViolationType::RightClick => self.right_click_count,
            ViolationType::PrintScreen => self.print_screen_count,
            ViolationType::DevTools => self.dev_tools_count,
            ViolationType::FullScreenExit => self.full_screen_exit_count,
            ViolationType::WindowBlur => self.window_blur_count,
            ViolationType::ApplicationSwitch => self.application_switch_count,
        }
    }

    /// Sum of every counter field on this document.
    pub fn total_violations(&self) -> i64 {
        ViolationType::ALL.iter().map(|k| self.count(*k)).sum()
    }
}

/// One user's single permitted engagement with one exam's question set.
/// Unique on (examId, userId); `completedAt` is set exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAttempt {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub exam_id: String,
    pub user_id: String,
    pub started_at: bson::DateTime,
    #[serde(default)]
    pub completed_at: Option<bson::DateTime>,
}

/// Exam metadata. The `[liveDate, deadDate]` window gates question access
/// and must be checked against wall-clock time at request time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub exam_id: String,
    pub exam_name: String,
    pub total_questions: i64,
    /// Duration in minutes.
    pub duration: i64,
    pub live_date: bson::DateTime,
    pub dead_date: bson::DateTime,
    /// Empty means the exam is public and no code is required.
    #[serde(default)]
    pub exam_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub option_text: String,
    pub is_correct: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub exam_id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub ansmarks: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_type_wire_names_are_camel_case() {
        let json = serde_json::to_string(&ViolationType::NoFace).unwrap();
        assert_eq!(json, "\"noFace\"");
        let json = serde_json::to_string(&ViolationType::FullScreenExit).unwrap();
        assert_eq!(json, "\"fullScreenExit\"");
    }

    #[test]
    fn count_fields_match_document_schema() {
        assert_eq!(ViolationType::NoFace.count_field(), "noFaceCount");
        assert_eq!(
            ViolationType::ApplicationSwitch.count_field(),
            "applicationSwitchCount"
        );
        let mut fields: Vec<&str> = ViolationType::ALL.iter().map(|k| k.count_field()).collect();
        fields.sort();
        fields.dedup();
        assert_eq!(fields.len(), 14);
    }

    #[test]
    fn total_violations_sums_all_counters() {
        let log = CheatingLog {
            no_face_count: 2,
            cell_phone_count: 1,
            tab_switch_count: 4,
            ..Default::default()
        };
        assert_eq!(log.total_violations(), 7);
        assert_eq!(log.count(ViolationType::TabSwitch), 4);
        assert_eq!(log.count(ViolationType::DevTools), 0);
    }

    #[test]
    fn evidence_round_trips_rfc3339_detected_at() {
        let json = r#"{"url":"https://cdn.example/e.jpg","type":"cellPhone","detectedAt":"2026-08-06T10:15:00Z","confidence":0.82}"#;
        let evidence: Evidence = serde_json::from_str(json).unwrap();
        assert_eq!(evidence.kind, ViolationType::CellPhone);
        assert_eq!(evidence.confidence, Some(0.82));
        let back = serde_json::to_string(&evidence).unwrap();
        assert!(back.contains("2026-08-06T10:15:00"));
    }
}
