use std::cell::Cell;
use std::time::Duration;

use poh_application::{RenderOutcome, Session};
use poh_core::DocumentId;
use poh_test::{FakeDocument, ManualScheduler, make_settings};

fn retrying_session(scheduler: std::sync::Arc<ManualScheduler>) -> Session {
    let mut settings = make_settings();
    settings.load.retry_delay_ms = 250;
    Session::new(settings, scheduler)
}

#[test]
fn open_succeeds_after_a_failed_attempt() -> anyhow::Result<()> {
    let scheduler = ManualScheduler::new();
    let mut session = retrying_session(scheduler.clone());
    let attempts = Cell::new(0);

    session.open_with_retries(Some(DocumentId("a".into())), "poh.pdf", b"%PDF", |_| {
        attempts.set(attempts.get() + 1);
        if attempts.get() < 2 {
            anyhow::bail!("worker not ready");
        }
        Ok(FakeDocument::from_texts(&["one", "two"]).boxed())
    })?;

    assert_eq!(attempts.get(), 2);
    assert_eq!(scheduler.sleeps(), vec![Duration::from_millis(250)]);
    assert!(session.is_loaded());
    assert_eq!(session.page_count(), 2);
    assert_eq!(session.document_name(), Some("poh.pdf"));
    assert_eq!(session.document_id(), Some(&DocumentId("a".into())));
    Ok(())
}

#[test]
fn open_gives_up_and_unloads() {
    let scheduler = ManualScheduler::new();
    let mut session = retrying_session(scheduler.clone());
    session.load_document(None, "old.pdf", FakeDocument::from_texts(&["old"]).boxed());
    let attempts = Cell::new(0);

    let result = session.open_with_retries(None, "broken.pdf", b"junk", |bytes| {
        attempts.set(attempts.get() + 1);
        anyhow::bail!("bad header in {} bytes", bytes.len())
    });

    let err = result.err().map(|err| format!("{err:#}")).unwrap_or_default();
    assert!(err.contains("after 3 attempts"), "{err}");
    assert!(err.contains("bad header in 4 bytes"), "{err}");
    assert_eq!(attempts.get(), 3);
    assert_eq!(scheduler.sleeps().len(), 2);
    assert!(!session.is_loaded());
    assert_eq!(session.page_count(), 0);
    assert_eq!(session.current_page(), 0);
}

#[test]
fn loading_resets_per_document_state() {
    let mut session = Session::new(make_settings(), ManualScheduler::new());
    session.load_document(None, "a.pdf", FakeDocument::from_texts(&["oil", "oil", "oil"]).boxed());
    session.go_to_page(3);
    let stale_search = session.cancel_search();

    let second = FakeDocument::from_texts(&["fuel"]);
    let extractions = second.extractions();
    session.load_document(None, "b.pdf", second.boxed());

    assert!(stale_search.is_cancelled());
    assert_eq!(session.current_page(), 1);
    assert_eq!(extractions.get(), 0);
    assert!(session.search("oil").hits.is_empty());
    assert_eq!(session.search("fuel").hits.len(), 1);
}

#[test]
fn broken_page_reads_as_empty() {
    let mut session = Session::new(make_settings(), ManualScheduler::new());
    let doc = FakeDocument::from_texts(&["fuel", "fuel"]).with_broken_page(1);
    session.load_document(None, "poh.pdf", doc.boxed());

    assert_eq!(session.raw_text(1), "");
    let pages: Vec<u32> = session.search("fuel").hits.iter().map(|hit| hit.page).collect();
    assert_eq!(pages, vec![2]);
}

#[test]
fn newer_render_supersedes_older() -> anyhow::Result<()> {
    let mut session = Session::new(make_settings(), ManualScheduler::new());
    assert!(session.begin_render().is_none());
    session.load_document(None, "poh.pdf", FakeDocument::from_texts(&["a", "b"]).boxed());

    let first = session
        .begin_render()
        .ok_or_else(|| anyhow::anyhow!("no ticket"))?;
    session.next_page();
    let second = session
        .begin_render()
        .ok_or_else(|| anyhow::anyhow!("no ticket"))?;

    assert!(matches!(
        session.complete_render(first, 100, 100)?,
        RenderOutcome::Superseded
    ));
    match session.complete_render(second, 100, 100)? {
        RenderOutcome::Rendered { page, bitmap } => {
            assert_eq!(page, 2);
            assert_eq!(bitmap.width, 100);
        }
        RenderOutcome::Superseded => anyhow::bail!("current render was superseded"),
    }

    session.unload();
    assert!(matches!(
        session.complete_render(second, 100, 100)?,
        RenderOutcome::Superseded
    ));
    Ok(())
}
