use chrono::{TimeZone as _, Utc};
use poh_application::feedback_report;
use poh_core::DocumentId;
use poh_test::{FakeDocument, ManualScheduler, make_session, outline_entry};

#[test]
fn report_names_the_document_page_and_section() {
    let mut session = make_session(ManualScheduler::new());
    let doc = FakeDocument::blank_pages(12)
        .with_outline(vec![outline_entry("Normal Procedures", 4)]);
    session.load_document(Some(DocumentId("c172.pdf_10_5".into())), "c172.pdf", doc.boxed());
    session.go_to_page(6);
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 8, 30, 15).unwrap();

    let report = feedback_report(&session, "Checklist skipped a line", now);

    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[2], "Date: 2025-01-02T08:30:15.000Z");
    assert_eq!(lines[3], "PDF: c172.pdf");
    assert_eq!(lines[4], "Page: 6/12");
    assert_eq!(lines[5], "Section: Normal Procedures");
    assert!(lines[6].starts_with("Platform: "));
    assert_eq!(&lines[7..], ["", "Feedback:", "Checklist skipped a line"]);
}

#[test]
fn report_falls_back_to_the_library_id() {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(
        Some(DocumentId("poh_1_2".into())),
        "",
        FakeDocument::blank_pages(3).boxed(),
    );
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 8, 30, 15).unwrap();

    let report = feedback_report(&session, "ok", now);

    assert!(report.contains("PDF: poh_1_2\nPage: 1/3\n"));
    assert!(!report.contains("Section:"));
}
