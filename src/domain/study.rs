//! Study rows and their joined display projection.

use serde::{Deserialize, Serialize};

/// Derived sign-off state of a study.
///
/// The flags are the source of truth; this enum is a read-side view. The
/// `(0,1)` combination is unreachable through the state machine except via
/// the admin escape hatch, and renders as `FullySigned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignState {
    Unsigned,
    ResidentSigned,
    FullySigned,
}

/// Fields required to register a study.
///
/// Registration itself belongs to the intake workflow; the store exposes it
/// for that workflow, the CLI, and tests.
#[derive(Debug, Clone, Default)]
pub struct NewStudy {
    pub patient_id: i64,
    pub modality_id: i64,
    pub exam_type_id: i64,
    pub exam_date: String,
    pub exam_time: String,
    pub exam_details: Option<String>,
    pub description: Option<String>,
    pub patient_age: Option<i64>,
    pub resident_id: i64,
    pub attending_id: i64,
    pub dicom_url: Option<String>,
}

/// Joined projection of a study with patient, exam and physician display
/// fields. This is the snapshot the formatter, the sign-off state machine
/// and the notifier all consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyDetail {
    pub id: i64,
    pub exam_date: String,
    pub exam_time: String,
    pub exam_details: Option<String>,
    pub description: Option<String>,
    pub modality_code: String,
    pub exam_type_code: String,
    pub patient_code: String,
    pub patient_firstname: Option<String>,
    pub patient_lastname: Option<String>,
    pub patient_age: Option<i64>,
    pub patient_gender: Option<String>,
    pub resident_id: i64,
    pub attending_id: i64,
    pub resident_fullname: Option<String>,
    pub attending_fullname: Option<String>,
    pub resident_checked: bool,
    pub attending_checked: bool,
    pub chat_id: Option<String>,
    pub message_id: Option<i64>,
    pub audio_path: Option<String>,
    pub report_path: Option<String>,
    pub dicom_url: Option<String>,
}

impl StudyDetail {
    pub fn sign_state(&self) -> SignState {
        match (self.resident_checked, self.attending_checked) {
            (_, true) => SignState::FullySigned,
            (true, false) => SignState::ResidentSigned,
            (false, false) => SignState::Unsigned,
        }
    }

    /// True once the study has been mirrored to the chat at least once.
    pub fn has_mirror(&self) -> bool {
        self.chat_id.is_some() && self.message_id.is_some()
    }
}
