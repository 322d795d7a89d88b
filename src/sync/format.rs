//! Study message formatting.
//!
//! Pure mapping from a study snapshot to the provider's HTML-flavored markup.
//! Every interpolated value passes through [`esc`] first; the only raw markup
//! in the output is what this module emits itself.

use crate::domain::StudyDetail;

/// Minimal HTML escaping for `parse_mode: HTML` payloads.
pub fn esc(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn or_dash(value: Option<&str>) -> String {
    esc(value.unwrap_or("-"))
}

/// Render the mirrored chat message for a study.
///
/// Deterministic: the same snapshot always yields the same text. Section
/// order is fixed; optional sections are skipped entirely when absent.
pub fn build_study_message(study: &StudyDetail) -> String {
    let mut lines = Vec::new();

    lines.push("<b>\u{1FA7A} Study</b>".to_string());
    lines.push(format!(
        "Study #{} \u{2014} {} ({})",
        study.id,
        esc(&study.exam_type_code),
        esc(&study.modality_code)
    ));
    if let Some(details) = &study.exam_details {
        lines.push(format!("Details: {}", esc(details)));
    }

    lines.push(format!(
        "Patient: <b>{} {}</b> <i>(code {})</i>",
        or_dash(study.patient_firstname.as_deref()),
        or_dash(study.patient_lastname.as_deref()),
        esc(&study.patient_code)
    ));

    let age_gender: Vec<String> = [
        study.patient_age.map(|age| format!("Age: {}", age)),
        study
            .patient_gender
            .as_deref()
            .map(|g| format!("Gender: {}", esc(g))),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !age_gender.is_empty() {
        lines.push(age_gender.join(" \u{2022} "));
    }

    lines.push(format!(
        "Date/Time: {} {}",
        esc(&study.exam_date),
        esc(&study.exam_time)
    ));

    if let Some(note) = &study.description {
        lines.push(format!("Note: {}", esc(note)));
    }

    lines.push(format!(
        "Resident: {}",
        or_dash(study.resident_fullname.as_deref())
    ));
    lines.push(format!(
        "Attending: {}",
        or_dash(study.attending_fullname.as_deref())
    ));

    lines.push(format!("Audio: {}", check_mark(study.audio_path.is_some())));
    lines.push(format!("Report: {}", check_mark(study.report_path.is_some())));

    lines.push(format!(
        "Status: Resident <b>{}</b> \u{2022} Attending <b>{}</b>",
        check_mark(study.resident_checked),
        check_mark(study.attending_checked)
    ));

    if let Some(url) = &study.dicom_url {
        lines.push(format!("<a href=\"{}\">Open DICOM</a>", esc(url)));
    }

    lines.join("\n")
}

fn check_mark(set: bool) -> &'static str {
    if set {
        "\u{2714}"
    } else {
        "\u{2716}"
    }
}
