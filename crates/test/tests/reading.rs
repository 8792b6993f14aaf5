use poh_application::{NO_TEXT_MESSAGE, PlayerState, SpeechEvent, Step, StopMode};
use poh_test::{
    FakeDocument, ManualScheduler, RecordingSpeech, finish_chunk, finish_run, make_session,
    make_settings, outline_entry,
};

const BEFORE_START: &str = "Before starting the engine set the fuel selector valve to the \
fuller tank.
Check that the mixture is full rich and the carburetor heat is set to cold.
Prime the engine with three strokes when cold and lock the primer in place.
Clear the propeller area and engage the starter.";

fn checklist() -> FakeDocument {
    FakeDocument::from_texts(&[BEFORE_START, "Vref 65 KIAS", ""])
}

#[test]
fn page_read_runs_to_the_end() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    assert_eq!(session.read_current_page(&mut engine)?, Step::Wait);
    finish_run(&mut session, &mut engine)?;

    assert_eq!(session.player().state(), &PlayerState::Finished);
    assert_eq!(engine.spoken.len(), 2);
    assert!(engine.spoken[0].text.starts_with("Before starting the engine"));
    assert!(engine.spoken[1].text.ends_with("engage the starter."));
    assert!(engine.spoken.iter().all(|u| u.text.chars().count() <= 220));

    let progress = session.read_progress().cloned();
    let text_len = session.cleaned_text(1).chars().count();
    assert_eq!(progress.map(|p| p.offset), Some(text_len));
    Ok(())
}

#[test]
fn finished_page_reads_again() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.go_to_page(2);
    session.read_current_page(&mut engine)?;
    finish_run(&mut session, &mut engine)?;
    assert_eq!(session.player().state(), &PlayerState::Finished);

    assert_eq!(session.read_current_page(&mut engine)?, Step::Wait);
    assert_eq!(engine.texts(), vec!["Vref 65 KIAS", "Vref 65 KIAS"]);
    assert_eq!(session.player().state(), &PlayerState::Speaking);

    finish_run(&mut session, &mut engine)?;
    session.resume_reading(&mut engine)?;
    assert_eq!(engine.spoken.len(), 3);
    Ok(())
}

#[test]
fn page_read_resumes_after_stop() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.read_current_page(&mut engine)?;
    finish_chunk(&mut session, &mut engine)?;
    let second_chunk = engine.spoken[1].text.clone();
    session.stop_reading(&mut engine, StopMode::KeepProgress);
    assert_eq!(session.player().state(), &PlayerState::Stopped);
    assert!(session.player().can_resume());

    let mut resumed = RecordingSpeech::new();
    session.read_current_page(&mut resumed)?;
    assert_eq!(resumed.texts(), vec![second_chunk.as_str()]);
    Ok(())
}

#[test]
fn changed_text_restarts_from_the_top() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();
    session.read_current_page(&mut engine)?;
    finish_chunk(&mut session, &mut engine)?;
    session.stop_reading(&mut engine, StopMode::KeepProgress);
    let saved = session.read_progress().cloned();
    assert!(saved.as_ref().is_some_and(|p| p.offset > 0));

    let revised = FakeDocument::from_texts(&[&format!("Amended. {BEFORE_START}")]);
    session.load_document(None, "poh.pdf", revised.boxed());
    assert!(session.read_progress().is_none());
    session.restore_read_progress(saved);

    let mut engine = RecordingSpeech::new();
    session.read_current_page(&mut engine)?;
    assert!(engine.spoken[0].text.starts_with("Amended. Before starting"));
    Ok(())
}

#[test]
fn resume_reading_returns_to_the_saved_page() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    let doc = FakeDocument::from_texts(&["Runup checks", BEFORE_START]);
    session.load_document(None, "poh.pdf", doc.boxed());
    let mut engine = RecordingSpeech::new();

    session.go_to_page(2);
    session.read_current_page(&mut engine)?;
    finish_chunk(&mut session, &mut engine)?;
    let second_chunk = engine.spoken[1].text.clone();
    session.stop_reading(&mut engine, StopMode::KeepProgress);

    session.go_to_page(1);
    let mut resumed = RecordingSpeech::new();
    session.resume_reading(&mut resumed)?;
    assert_eq!(session.current_page(), 2);
    assert_eq!(resumed.texts(), vec![second_chunk.as_str()]);
    Ok(())
}

#[test]
fn discarded_progress_cannot_resume() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.read_current_page(&mut engine)?;
    session.stop_reading(&mut engine, StopMode::Discard);
    assert!(engine.cancels >= 1);
    assert!(!session.player().can_resume());
    assert_eq!(session.resume_reading(&mut engine)?, Step::Done);
    Ok(())
}

#[test]
fn stale_events_are_ignored() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.read_current_page(&mut engine)?;
    let old = engine.last_ticket();
    session.go_to_page(2);
    session.read_current_page(&mut engine)?;
    assert_eq!(engine.cancels, 1);

    let old = old.ok_or_else(|| anyhow::anyhow!("first run spoke nothing"))?;
    let step = session.handle_speech_event(&mut engine, old, SpeechEvent::Ended)?;
    assert_eq!(step, Step::Wait);
    assert_eq!(engine.spoken.len(), 2);
    assert_eq!(engine.spoken[1].text, "Vref 65 KIAS");
    Ok(())
}

#[test]
fn interruption_continues_with_next_chunk() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.read_current_page(&mut engine)?;
    let ticket = engine.last_ticket().ok_or_else(|| anyhow::anyhow!("nothing spoken"))?;
    let step = session.handle_speech_event(
        &mut engine,
        ticket,
        SpeechEvent::Error("interrupted".to_string()),
    )?;
    let Step::RetryAfter(delay) = step else {
        anyhow::bail!("expected a retry, got {step:?}");
    };
    assert_eq!(delay.as_millis(), 80);

    session.continue_reading(&mut engine, ticket.run)?;
    assert_eq!(engine.spoken.len(), 2);
    assert!(engine.spoken[1].text.ends_with("engage the starter."));

    let ticket = engine.last_ticket().ok_or_else(|| anyhow::anyhow!("nothing spoken"))?;
    let step = session.handle_speech_event(
        &mut engine,
        ticket,
        SpeechEvent::Error("audio-busy".to_string()),
    )?;
    assert_eq!(step, Step::Done);
    assert_eq!(
        session.player().state(),
        &PlayerState::Failed("audio-busy".to_string())
    );
    Ok(())
}

#[test]
fn empty_page_reads_the_fallback_message() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.go_to_page(3);
    session.read_current_page(&mut engine)?;
    assert_eq!(engine.texts(), vec![NO_TEXT_MESSAGE]);
    Ok(())
}

#[test]
fn reading_from_a_hit_keeps_the_view() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.read_from_hit(&mut engine, 2)?;
    assert_eq!(engine.texts(), vec!["Page 2. Vref 65 KIAS"]);
    assert_eq!(session.current_page(), 1);
    assert_eq!(
        session.read_progress().map(|p| p.label.as_str()),
        Some("best-place")
    );

    session.read_from_hit(&mut engine, 3)?;
    assert_eq!(
        engine.spoken.last().map(|u| u.text.clone()),
        Some(format!("Page 3. {NO_TEXT_MESSAGE}"))
    );
    Ok(())
}

#[test]
fn section_read_is_prefixed_and_capped() -> anyhow::Result<()> {
    let mut settings = make_settings();
    settings.speech.section_max_pages = 2;
    let mut session = poh_application::Session::new(settings, ManualScheduler::new());
    let doc = FakeDocument::from_texts(&["Intro", "Oil", "Magnetos", "Fuel", "Lights"])
        .with_outline(vec![outline_entry("General", 1), outline_entry("Engine", 2)]);
    session.load_document(None, "poh.pdf", doc.boxed());
    let mut engine = RecordingSpeech::new();

    session.go_to_page(3);
    session.read_current_section(&mut engine)?;
    assert_eq!(
        engine.texts(),
        vec!["Section: Engine. Pages 2 to 3. Oil Magnetos"]
    );
    assert_eq!(session.read_progress().map(|p| p.page), Some(2));
    Ok(())
}

#[test]
fn section_read_without_outline_reads_the_page() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    session.load_document(None, "poh.pdf", checklist().boxed());
    let mut engine = RecordingSpeech::new();

    session.go_to_page(2);
    session.read_current_section(&mut engine)?;
    assert_eq!(engine.texts(), vec!["Vref 65 KIAS"]);
    Ok(())
}

#[test]
fn page_text_is_extracted_once() -> anyhow::Result<()> {
    let mut session = make_session(ManualScheduler::new());
    let doc = checklist();
    let extractions = doc.extractions();
    session.load_document(None, "poh.pdf", doc.boxed());
    let mut engine = RecordingSpeech::new();

    session.read_current_page(&mut engine)?;
    session.read_current_page(&mut engine)?;
    session.search("fuel selector");
    session.ask("carburetor heat");
    session.raw_text(1);

    assert_eq!(extractions.get(), 3);
    Ok(())
}
