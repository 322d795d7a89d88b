//! Final-sign broadcast notifications.
//!
//! Fire-and-forget: a failed or unconfigured broadcast is logged and the
//! triggering sign-off proceeds untouched.

use std::sync::Arc;

use tracing::warn;

use crate::adapters::MessagingApi;
use crate::domain::StudyDetail;
use crate::sync::esc;

/// Broadcasts a sign-off announcement to a channel separate from the
/// per-study mirrors.
pub struct NotificationDispatcher {
    api: Arc<dyn MessagingApi>,
    /// Broadcast target; `None` disables announcements.
    chat_id: Option<String>,
}

impl NotificationDispatcher {
    pub fn new(api: Arc<dyn MessagingApi>, chat_id: Option<String>) -> Self {
        Self { api, chat_id }
    }

    /// Announce that a study's report is finally signed.
    ///
    /// Never fails: every error path ends in a log line.
    pub async fn announce_final_sign(&self, study: &StudyDetail, report_text: &str) {
        let Some(chat_id) = &self.chat_id else {
            warn!(study_id = study.id, "broadcast chat not configured, skipping announcement");
            return;
        };

        let text = build_announcement(study, report_text);
        if let Err(err) = self.api.send_message(chat_id, &text).await {
            warn!(study_id = study.id, error = %err, "final-sign announcement failed");
        }
    }
}

fn build_announcement(study: &StudyDetail, report_text: &str) -> String {
    let details = study
        .exam_details
        .as_deref()
        .map(|d| format!(" ({})", esc(d)))
        .unwrap_or_default();

    let mut lines = vec![
        "<b>Final report signed</b>".to_string(),
        format!(
            "<b>Study #{}</b> \u{2014} {}{}, {}",
            study.id,
            esc(&study.exam_type_code),
            details,
            esc(&study.modality_code)
        ),
        format!(
            "Patient: <b>{} {}, code: {}</b>",
            esc(study.patient_firstname.as_deref().unwrap_or("-")),
            esc(study.patient_lastname.as_deref().unwrap_or("")),
            esc(&study.patient_code)
        ),
        format!(
            "Resident: <b>{}</b>",
            esc(study.resident_fullname.as_deref().unwrap_or("-"))
        ),
        format!(
            "Attending: <b>{}</b>",
            esc(study.attending_fullname.as_deref().unwrap_or("-"))
        ),
        format!(
            "Date/Time: {} {}",
            esc(&study.exam_date),
            esc(&study.exam_time)
        ),
    ];

    if !report_text.is_empty() {
        lines.push(format!("<pre>{}</pre>", bold_markup_to_html(&esc(report_text))));
    }

    lines.join("\n")
}

/// Convert the dictation convention `**emphasis**` into the provider's bold
/// tag. Input must already be HTML-escaped. An unmatched trailing delimiter
/// is kept literal.
fn bold_markup_to_html(text: &str) -> String {
    let parts: Vec<&str> = text.split("**").collect();
    let mut out = String::with_capacity(text.len());
    for (i, part) in parts.iter().enumerate() {
        if i % 2 == 1 {
            if i == parts.len() - 1 {
                out.push_str("**");
                out.push_str(part);
            } else {
                out.push_str("<b>");
                out.push_str(part);
                out.push_str("</b>");
            }
        } else {
            out.push_str(part);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_study() -> StudyDetail {
        StudyDetail {
            id: 7,
            exam_date: "2024-11-02".to_string(),
            exam_time: "10:30".to_string(),
            modality_code: "CT".to_string(),
            exam_type_code: "BRAIN_WC".to_string(),
            patient_code: "P-100".to_string(),
            patient_firstname: Some("Jane".to_string()),
            patient_lastname: Some("Doe".to_string()),
            resident_fullname: Some("Res Ident".to_string()),
            attending_fullname: Some("Att Ending".to_string()),
            attending_checked: true,
            resident_checked: true,
            ..StudyDetail::default()
        }
    }

    #[test]
    fn test_bold_conversion() {
        assert_eq!(bold_markup_to_html("**Findings** normal"), "<b>Findings</b> normal");
        assert_eq!(
            bold_markup_to_html("a **b** c **d** e"),
            "a <b>b</b> c <b>d</b> e"
        );
        assert_eq!(bold_markup_to_html("no markup"), "no markup");
    }

    #[test]
    fn test_unmatched_delimiter_stays_literal() {
        assert_eq!(bold_markup_to_html("broken **bold"), "broken **bold");
    }

    #[test]
    fn test_announcement_layout() {
        let text = build_announcement(&sample_study(), "**Impression**: clear");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "<b>Final report signed</b>");
        assert_eq!(lines[1], "<b>Study #7</b> \u{2014} BRAIN_WC, CT");
        assert_eq!(lines[2], "Patient: <b>Jane Doe, code: P-100</b>");
        assert_eq!(lines[3], "Resident: <b>Res Ident</b>");
        assert_eq!(lines[4], "Attending: <b>Att Ending</b>");
        assert_eq!(lines[5], "Date/Time: 2024-11-02 10:30");
        assert_eq!(lines[6], "<pre><b>Impression</b>: clear</pre>");
    }

    #[test]
    fn test_report_escaped_before_bold_conversion() {
        let text = build_announcement(&sample_study(), "size < 3mm & **stable**");
        assert!(text.contains("size &lt; 3mm &amp; <b>stable</b>"));
    }

    #[test]
    fn test_empty_report_omits_body() {
        let text = build_announcement(&sample_study(), "");
        assert!(!text.contains("<pre>"));
    }
}
