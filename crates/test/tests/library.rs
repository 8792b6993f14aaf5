use poh_application::{Session, StopMode};
use poh_core::{DocumentId, LibraryEntry, LibraryRecord};
use poh_storage::Storage;
use poh_test::{FakeDocument, ManualScheduler, RecordingSpeech, finish_chunk, make_settings};

const LONG_PAGE: &str = "Normal takeoff: wing flaps up, carburetor heat cold, full throttle \
applied smoothly.
Elevator control lift nose wheel at fifty five KIAS and climb at seventy to seventy five KIAS.
Short field takeoff: wing flaps ten degrees, brakes applied, full throttle before brake release.
Climb at fifty six KIAS until all obstacles are cleared, then retract flaps slowly.";

fn record(bytes: &[u8]) -> LibraryRecord {
    LibraryRecord {
        entry: LibraryEntry {
            id: DocumentId::from_file_meta("c172.pdf", bytes.len() as u64, 1_700_000_000_000),
            name: "c172.pdf".to_string(),
            size: bytes.len() as u64,
            last_modified: 1_700_000_000_000,
            saved_at: 1_700_000_100_000,
        },
        bytes: bytes.to_vec(),
    }
}

fn parse(bytes: &[u8]) -> anyhow::Result<Box<dyn poh_engine::Document>> {
    let text = std::str::from_utf8(bytes)?;
    Ok(FakeDocument::from_texts(&[text]).boxed())
}

#[test]
fn reading_position_survives_a_restart() -> anyhow::Result<()> {
    let storage = Storage::open_in_memory()?;
    let saved = record(LONG_PAGE.as_bytes());
    storage.save_document(&saved)?;
    let id = saved.entry.id.clone();

    let mut session = Session::new(make_settings(), ManualScheduler::new());
    session.open_with_retries(Some(id.clone()), &saved.entry.name, &saved.bytes, parse)?;
    let mut engine = RecordingSpeech::new();
    session.read_current_page(&mut engine)?;
    finish_chunk(&mut session, &mut engine)?;
    let second_chunk = engine.spoken[1].text.clone();
    session.stop_reading(&mut engine, StopMode::KeepProgress);
    storage.save_read_progress(&id, session.read_progress())?;

    let reopened = storage
        .last_opened()?
        .ok_or_else(|| anyhow::anyhow!("no last opened document"))?;
    assert_eq!(reopened.entry, saved.entry);

    let mut session = Session::new(make_settings(), ManualScheduler::new());
    session.open_with_retries(
        Some(reopened.entry.id.clone()),
        &reopened.entry.name,
        &reopened.bytes,
        parse,
    )?;
    session.restore_read_progress(storage.load_read_progress(&id)?);
    assert!(session.player().can_resume());

    let mut engine = RecordingSpeech::new();
    session.resume_reading(&mut engine)?;
    assert_eq!(engine.texts(), vec![second_chunk.as_str()]);
    Ok(())
}

#[test]
fn deleting_a_document_forgets_its_progress() -> anyhow::Result<()> {
    let storage = Storage::open_in_memory()?;
    let saved = record(LONG_PAGE.as_bytes());
    storage.save_document(&saved)?;
    let id = saved.entry.id.clone();

    let mut session = Session::new(make_settings(), ManualScheduler::new());
    session.open_with_retries(Some(id.clone()), "c172.pdf", &saved.bytes, parse)?;
    let mut engine = RecordingSpeech::new();
    session.read_current_page(&mut engine)?;
    storage.save_read_progress(&id, session.read_progress())?;
    assert!(storage.load_read_progress(&id)?.is_some());

    storage.delete_document(&id)?;
    assert!(storage.load_read_progress(&id)?.is_none());
    assert!(storage.last_opened()?.is_none());
    assert!(storage.list_documents()?.is_empty());
    Ok(())
}

#[test]
fn stored_settings_drive_a_new_session() -> anyhow::Result<()> {
    let storage = Storage::open_in_memory()?;
    let mut settings = storage.load_settings()?;
    settings
        .set_value("speech.section_max_pages", "1")
        .map_err(anyhow::Error::msg)?;
    settings
        .set_value("ask.max_results", "2")
        .map_err(anyhow::Error::msg)?;
    storage.save_settings(&settings)?;

    let loaded = storage.load_settings()?;
    let session = Session::new(loaded, ManualScheduler::new());
    assert_eq!(session.settings().speech.section_max_pages, 1);
    assert_eq!(session.settings().ask.max_results, 2);
    Ok(())
}
