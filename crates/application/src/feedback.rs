use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::session::Session;

/// Plain-text feedback report about the current reading position.
pub fn feedback_report(session: &Session, feedback: &str, now: DateTime<Utc>) -> String {
    let document = session
        .document_name()
        .filter(|name| !name.is_empty())
        .or_else(|| session.document_id().map(|id| id.as_str()))
        .unwrap_or("—");
    let page = if session.is_loaded() {
        format!("{}/{}", session.current_page(), session.page_count())
    } else {
        "—".to_string()
    };

    let mut report = String::from("POH Reader Feedback\n===================\n");
    let _ = writeln!(report, "Date: {}", now.to_rfc3339_opts(SecondsFormat::Millis, true));
    let _ = writeln!(report, "PDF: {document}");
    let _ = writeln!(report, "Page: {page}");
    if let Some(section) = session.current_section() {
        let _ = writeln!(report, "Section: {}", section.title);
    }
    let _ = writeln!(
        report,
        "Platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let _ = write!(report, "\nFeedback:\n{}\n", feedback.trim_end());
    report
}
