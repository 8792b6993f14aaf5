use poh_core::{Destination, OutlineNode};
use poh_test::{FakeDocument, ManualScheduler, make_session, outline_entry};

fn handbook() -> FakeDocument {
    FakeDocument::blank_pages(30)
        .with_outline(vec![
            outline_entry("General", 3),
            outline_entry("Limitations", 10),
            OutlineNode::leaf("Emergency Procedures", Some(Destination::Named("emer".into()))),
            outline_entry("Performance", 25),
        ])
        .with_named_destination("emer", 10)
}

#[test]
fn outline_becomes_contiguous_ranges() {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", handbook().boxed());

    let ranges: Vec<(u32, u32)> = session
        .sections()
        .iter()
        .map(|section| (section.start, section.end))
        .collect();
    assert_eq!(ranges, vec![(3, 9), (10, 10), (10, 24), (25, 30)]);
    assert_eq!(session.sections()[2].title, "Emergency Procedures");
}

#[test]
fn navigation_tracks_the_current_section() {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", handbook().boxed());

    assert_eq!(session.current_page(), 1);
    assert!(session.current_section().is_none());
    assert_eq!(session.section_title_for_page(1), "");

    assert_eq!(session.go_to_page(12), 12);
    assert_eq!(
        session.current_section().map(|s| s.title.as_str()),
        Some("Emergency Procedures")
    );
    assert_eq!(session.go_to_page(99), 30);
    assert_eq!(session.next_page(), 30);
    assert_eq!(session.go_to_page(0), 1);
    assert_eq!(session.prev_page(), 1);

    let progress = session.progress();
    assert_eq!((progress.current_page, progress.total_pages), (1, 30));
}

#[test]
fn unresolvable_and_nested_entries() {
    let mut session = make_session(ManualScheduler::new());
    let doc = FakeDocument::blank_pages(8).with_outline(vec![
        outline_entry("Systems", 2).with_children(vec![
            outline_entry("  ", 4),
            OutlineNode::leaf("Missing", Some(Destination::Named("nowhere".into()))),
            OutlineNode::leaf("Unlinked", None),
        ]),
        outline_entry("Beyond the end", 40),
    ]);
    session.load_document(None, "poh.pdf", doc.boxed());

    let sections = session.sections();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].title, "Systems");
    assert_eq!((sections[0].start, sections[0].end, sections[0].level), (2, 3, 0));
    assert_eq!(sections[1].title, "(Untitled)");
    assert_eq!((sections[1].start, sections[1].end, sections[1].level), (4, 8, 1));
}

#[test]
fn section_filter_matches_titles() {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", handbook().boxed());

    let found: Vec<usize> = session
        .filter_sections("PRO")
        .into_iter()
        .map(|(index, _)| index)
        .collect();
    assert_eq!(found, vec![2]);
    assert_eq!(session.filter_sections("").len(), 4);
}

#[test]
fn document_without_outline_has_no_sections() {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", FakeDocument::blank_pages(3).boxed());
    assert!(session.sections().is_empty());
    assert!(session.filter_sections("anything").is_empty());
}
