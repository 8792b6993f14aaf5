use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use poh_application::{
    RenderOutcome, SearchOutcome, Session, SpeechEngine as _, SpeechEvent, Step, StopMode,
    SystemScheduler, default_voice, feedback_report, voice_menu,
};
use poh_core::{DocumentId, LibraryEntry, LibraryRecord, Settings};
use poh_engine::{Document, PdfDocument};
use poh_storage::Storage;
use tracing_subscriber::EnvFilter;

mod speech;

use speech::{CommandSpeech, PrintSpeech, SpeechDriver};

#[derive(Parser)]
#[command(name = "poh-reader", version, about = "Offline reader for pilot operating handbooks")]
struct Cli {
    /// Library database; defaults to $POH_READER_DB or the user config dir.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Library id to open instead of the last opened document.
    #[arg(long, global = true)]
    doc: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Save a PDF into the library and open it.
    Import { path: PathBuf },
    /// List, open or remove saved documents.
    Library {
        #[command(subcommand)]
        action: LibraryCmd,
    },
    /// Print the section table.
    Sections {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Exact, case-insensitive text search.
    Search { query: String },
    /// Rank the best places to look for an answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
        /// Keep scanning until every page is scored.
        #[arg(long)]
        all: bool,
    },
    /// Print the text of a page.
    Text {
        #[arg(long)]
        page: u32,
        /// Extracted text before speech cleaning.
        #[arg(long)]
        raw: bool,
    },
    /// Read aloud.
    Read {
        #[arg(long)]
        page: Option<u32>,
        /// Read the section around the page.
        #[arg(long, conflicts_with_all = ["resume", "hit"])]
        section: bool,
        /// Continue the last read.
        #[arg(long, conflicts_with = "hit")]
        resume: bool,
        /// Read a ranked page from the top.
        #[arg(long)]
        hit: Option<u32>,
        /// Stop after this many chunks, keeping the position.
        #[arg(long)]
        max_chunks: Option<usize>,
        /// Print chunks instead of speaking them.
        #[arg(long)]
        print: bool,
    },
    /// List the voice menu.
    Voices,
    /// Render a page to a PNG file.
    Render {
        #[arg(long)]
        page: u32,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1200)]
        width: i32,
        #[arg(long, default_value_t = 4000)]
        max_height: i32,
    },
    /// Serve the web assets.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Print a feedback report for the current reading position.
    Feedback {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show or change settings.
    Settings {
        #[command(subcommand)]
        action: Option<SettingsCmd>,
    },
}

#[derive(Subcommand)]
enum LibraryCmd {
    List,
    Open { id: String },
    Delete { id: String },
    Clear,
}

#[derive(Subcommand)]
enum SettingsCmd {
    Show,
    /// Set a dotted key such as `ask.time_budget_ms`.
    Set { key: String, value: String },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let storage = Storage::open(db_path(cli.db)?)?;
    let settings = storage.load_settings()?;

    match cli.command {
        Cmd::Import { path } => import(&storage, settings, &path),
        Cmd::Library { action } => library(&storage, action),
        Cmd::Settings { action } => settings_cmd(&storage, settings, action),
        Cmd::Serve { host, port, root } => serve(&settings, &host, port, root),
        Cmd::Voices => voices(&settings),
        Cmd::Feedback { text } => feedback(&storage, settings, cli.doc.as_deref(), &text.join(" ")),
        command => {
            let (id, mut session) = open_session(&storage, settings, cli.doc.as_deref())?;
            document_cmd(&storage, &id, &mut session, command)
        }
    }
}

fn db_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit.or_else(|| std::env::var_os("POH_READER_DB").map(PathBuf::from)) {
        return Ok(path);
    }
    let project_dirs =
        ProjectDirs::from("dev", "poh", "poh-reader").context("resolve project dirs")?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;
    Ok(config_dir.join("poh-reader.db"))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

fn new_session(settings: Settings) -> Session {
    Session::new(settings, Arc::new(SystemScheduler::new()))
}

fn open_record(session: &mut Session, record: &LibraryRecord) -> anyhow::Result<()> {
    session.open_with_retries(
        Some(record.entry.id.clone()),
        &record.entry.name,
        &record.bytes,
        |bytes| Ok(Box::new(PdfDocument::from_bytes(bytes.to_vec())?) as Box<dyn Document>),
    )
}

fn import(storage: &Storage, settings: Settings, path: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    let last_modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64);

    let record = LibraryRecord {
        entry: LibraryEntry {
            id: DocumentId::from_file_meta(&name, meta.len(), last_modified),
            name,
            size: meta.len(),
            last_modified,
            saved_at: now_ms(),
        },
        bytes,
    };
    storage.save_document(&record)?;

    let mut session = new_session(settings);
    open_record(&mut session, &record)?;
    println!(
        "Saved {} as {} ({} pages, {} sections)",
        record.entry.name,
        record.entry.id,
        session.page_count(),
        session.sections().len()
    );
    Ok(())
}

fn library(storage: &Storage, action: LibraryCmd) -> anyhow::Result<()> {
    match action {
        LibraryCmd::List => {
            let last = storage.last_opened_id()?;
            let entries = storage.list_documents()?;
            if entries.is_empty() {
                println!("Library is empty.");
            }
            for entry in entries {
                let marker = if last.as_ref() == Some(&entry.id) { "*" } else { " " };
                println!(
                    "{marker} {}\t{}\t{} bytes",
                    entry.id, entry.name, entry.size
                );
            }
        }
        LibraryCmd::Open { id } => {
            let id = DocumentId(id);
            storage
                .get_document(&id)?
                .with_context(|| format!("no document {id} in the library"))?;
            storage.set_last_opened(Some(&id))?;
            println!("Opened {id}");
        }
        LibraryCmd::Delete { id } => {
            storage.delete_document(&DocumentId(id))?;
        }
        LibraryCmd::Clear => {
            storage.clear_documents()?;
        }
    }
    Ok(())
}

fn settings_cmd(
    storage: &Storage,
    mut settings: Settings,
    action: Option<SettingsCmd>,
) -> anyhow::Result<()> {
    if let Some(SettingsCmd::Set { key, value }) = action {
        settings
            .set_value(&key, &value)
            .map_err(|err| anyhow::anyhow!("{key}: {err}"))?;
        storage.save_settings(&settings)?;
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn serve(
    settings: &Settings,
    host: &str,
    port: Option<u16>,
    root: Option<PathBuf>,
) -> anyhow::Result<()> {
    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid address {host}:{port}"))?;
    let root = root.unwrap_or_else(|| PathBuf::from(&settings.server.web_root));

    let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    runtime.block_on(poh_server::serve(root, addr))
}

fn voices(settings: &Settings) -> anyhow::Result<()> {
    let engine = CommandSpeech::detect()?;
    let available = engine.voices();
    let selected = settings
        .speech
        .voice
        .clone()
        .or_else(|| default_voice(&available).map(|voice| voice.name));
    for voice in voice_menu(&available) {
        let marker = if selected.as_deref() == Some(voice.name.as_str()) { "*" } else { " " };
        println!("{marker} {} ({})", voice.name, voice.lang);
    }
    Ok(())
}

fn feedback(
    storage: &Storage,
    settings: Settings,
    doc: Option<&str>,
    text: &str,
) -> anyhow::Result<()> {
    let session = if doc.is_none() && storage.last_opened_id()?.is_none() {
        new_session(settings)
    } else {
        let (_, mut session) = open_session(storage, settings, doc)?;
        if let Some(page) = session.read_progress().map(|progress| progress.page) {
            session.go_to_page(page);
        }
        session
    };
    print!("{}", feedback_report(&session, text, Utc::now()));
    Ok(())
}

fn open_session(
    storage: &Storage,
    settings: Settings,
    doc: Option<&str>,
) -> anyhow::Result<(DocumentId, Session)> {
    let record = match doc {
        Some(id) => storage
            .get_document(&DocumentId(id.to_string()))?
            .with_context(|| format!("no document {id} in the library"))?,
        None => storage
            .last_opened()?
            .context("the library is empty; run `poh-reader import <file.pdf>` first")?,
    };

    let mut session = new_session(settings);
    open_record(&mut session, &record)?;
    storage.set_last_opened(Some(&record.entry.id))?;
    session.restore_read_progress(storage.load_read_progress(&record.entry.id)?);
    Ok((record.entry.id, session))
}

fn document_cmd(
    storage: &Storage,
    id: &DocumentId,
    session: &mut Session,
    command: Cmd,
) -> anyhow::Result<()> {
    match command {
        Cmd::Sections { filter } => {
            let sections = session.filter_sections(filter.as_deref().unwrap_or_default());
            if sections.is_empty() {
                println!("No sections.");
            }
            for (_, section) in sections {
                println!(
                    "{}{}  pp. {}-{}",
                    "  ".repeat(section.level),
                    section.title,
                    section.start,
                    section.end
                );
            }
        }
        Cmd::Search { query } => {
            let SearchOutcome { hits, .. } = session.search(&query);
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in hits {
                println!("p.{}: {}", hit.page, hit.context.replace('\n', " "));
            }
        }
        Cmd::Ask { question, all } => {
            let question = question.join(" ");
            let mut outcome = session.ask(&question);
            while all && !outcome.done {
                outcome = session.ask(&question);
            }
            if outcome.hits.is_empty() {
                println!("No matching places found.");
            }
            for (i, hit) in outcome.hits.iter().enumerate() {
                let title = if hit.section_title.is_empty() {
                    "Best place to look"
                } else {
                    hit.section_title.as_str()
                };
                println!("{}. {title} (p.{}, score {})", i + 1, hit.page, hit.score);
                if !hit.excerpt.is_empty() {
                    println!("   {}", hit.excerpt.replace('\n', " "));
                }
            }
            if !outcome.done {
                println!(
                    "Scanned through page {} of {}; pass --all to finish.",
                    outcome.scanned.end.saturating_sub(1),
                    session.page_count()
                );
            }
            println!("Safety: Always verify in the official POH/AFM.");
        }
        Cmd::Text { page, raw } => {
            let page = session.go_to_page(page);
            let text = if raw {
                session.raw_text(page)
            } else {
                session.cleaned_text(page)
            };
            println!("{}", session.progress());
            println!("{text}");
        }
        Cmd::Read {
            page,
            section,
            resume,
            hit,
            max_chunks,
            print,
        } => {
            if let Some(page) = page {
                session.go_to_page(page);
            }
            let mode = ReadMode {
                section,
                resume,
                hit,
            };
            if print {
                read_aloud(session, &mut PrintSpeech::default(), mode, max_chunks)?;
            } else {
                read_aloud(session, &mut CommandSpeech::detect()?, mode, max_chunks)?;
            }
            storage.save_read_progress(id, session.read_progress())?;
        }
        Cmd::Render {
            page,
            out,
            width,
            max_height,
        } => {
            session.go_to_page(page);
            match session.render_current(width, max_height)? {
                RenderOutcome::Rendered { page, bitmap } => {
                    let image = image::RgbaImage::from_raw(
                        bitmap.width as u32,
                        bitmap.height as u32,
                        bitmap.pixels,
                    )
                    .context("bitmap size mismatch")?;
                    image
                        .save(&out)
                        .with_context(|| format!("write {}", out.display()))?;
                    println!("Rendered page {page} to {}", out.display());
                }
                RenderOutcome::Superseded => println!("Render superseded."),
            }
        }
        Cmd::Import { .. }
        | Cmd::Library { .. }
        | Cmd::Settings { .. }
        | Cmd::Serve { .. }
        | Cmd::Feedback { .. }
        | Cmd::Voices => anyhow::bail!("command does not take an open document"),
    }
    Ok(())
}

struct ReadMode {
    section: bool,
    resume: bool,
    hit: Option<u32>,
}

/// Starts a read and feeds engine events to the session until the run ends.
fn read_aloud<E: SpeechDriver>(
    session: &mut Session,
    engine: &mut E,
    mode: ReadMode,
    max_chunks: Option<usize>,
) -> anyhow::Result<()> {
    let mut step = if mode.resume {
        if !session.player().can_resume() {
            println!("Nothing to resume.");
            return Ok(());
        }
        session.resume_reading(engine)?
    } else if let Some(page) = mode.hit {
        session.read_from_hit(engine, page)?
    } else if mode.section {
        session.read_current_section(engine)?
    } else {
        session.read_current_page(engine)?
    };

    let mut finished_chunks = 0;
    loop {
        step = match step {
            Step::Done => break,
            Step::Wait => {
                let (ticket, event) = engine.next_event()?;
                let ended = event == SpeechEvent::Ended;
                let next = session.handle_speech_event(engine, ticket, event)?;
                if ended && ticket.run == session.player().run_id() {
                    finished_chunks += 1;
                    if max_chunks.is_some_and(|max| finished_chunks >= max) {
                        session.stop_reading(engine, StopMode::KeepProgress);
                        break;
                    }
                }
                next
            }
            Step::RetryAfter(delay) => {
                std::thread::sleep(delay);
                let run = session.player().run_id();
                session.continue_reading(engine, run)?
            }
        };
    }
    Ok(())
}
