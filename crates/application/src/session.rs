use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use poh_core::{DocumentId, Progress, ReadProgress, SectionRange, Settings};
use poh_engine::Document;

use crate::ask::{AskOutcome, AskScanner, ScanLimits};
use crate::push_to_talk::PushToTalk;
use crate::render::{RenderGate, RenderOutcome, RenderTicket};
use crate::scheduler::Scheduler;
use crate::search::{CancelToken, SearchOutcome, exact_search};
use crate::sections::{
    build_sections, filter_sections, section_index_for_page, section_title_for_page,
};
use crate::speech::{
    ChunkTicket, ReadContext, SpeechEngine, SpeechEvent, SpeechPlayer, Step, StopMode,
    identity_key,
};
use crate::text::PageTextCache;

pub const NO_TEXT_MESSAGE: &str = "No readable text found on this page.";

struct LoadedDocument {
    id: Option<DocumentId>,
    name: String,
    text: PageTextCache,
    sections: Vec<SectionRange>,
    current_page: u32,
    current_section: Option<usize>,
}

/// Everything tied to the one open document: caches, section table, current
/// page, scan state and read progress.
pub struct Session {
    settings: Settings,
    scheduler: Arc<dyn Scheduler>,
    loaded: Option<LoadedDocument>,
    scanner: AskScanner,
    player: SpeechPlayer,
    render_gate: RenderGate,
    search_cancel: CancelToken,
    push_to_talk: PushToTalk,
}

impl Session {
    pub fn new(settings: Settings, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scanner: AskScanner::new(settings.ask.clone()),
            player: SpeechPlayer::new(settings.speech.clone()),
            settings,
            scheduler,
            loaded: None,
            render_gate: RenderGate::new(),
            search_cancel: CancelToken::new(),
            push_to_talk: PushToTalk::new(false),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.scanner.set_settings(settings.ask.clone());
        self.player.set_settings(settings.speech.clone());
        self.settings = settings;
    }

    /// Replaces the open document and resets all per-document state.
    pub fn load_document(
        &mut self,
        id: Option<DocumentId>,
        name: impl Into<String>,
        document: Box<dyn Document>,
    ) {
        self.reset_document_state();

        let sections = build_sections(document.as_ref());
        let name = name.into();
        tracing::info!(
            "loaded {name:?}: {} pages, {} sections",
            document.page_count(),
            sections.len()
        );

        let mut loaded = LoadedDocument {
            id,
            name,
            text: PageTextCache::new(document),
            sections,
            current_page: 1,
            current_section: None,
        };
        loaded.current_section = section_index_for_page(&loaded.sections, 1);
        self.loaded = Some(loaded);
    }

    /// Parses `bytes` with `load`, retrying with a fixed delay.
    ///
    /// On final failure the session is left with no document and the last
    /// error is returned.
    pub fn open_with_retries<F>(
        &mut self,
        id: Option<DocumentId>,
        name: &str,
        bytes: &[u8],
        mut load: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(&[u8]) -> anyhow::Result<Box<dyn Document>>,
    {
        let tries = self.settings.load.tries.max(1);
        let delay = Duration::from_millis(self.settings.load.retry_delay_ms);

        let mut last_err = None;
        for attempt in 1..=tries {
            match load(bytes) {
                Ok(document) => {
                    self.load_document(id, name, document);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!("open {name:?} attempt {attempt}/{tries} failed: {err:#}");
                    last_err = Some(err);
                    if attempt < tries {
                        self.scheduler.sleep(delay);
                    }
                }
            }
        }

        self.unload();
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no load attempts made"));
        Err(err).with_context(|| format!("open {name:?} after {tries} attempts"))
    }

    pub fn unload(&mut self) {
        self.reset_document_state();
        self.loaded = None;
    }

    fn reset_document_state(&mut self) {
        self.search_cancel.cancel();
        self.search_cancel = CancelToken::new();
        self.render_gate.cancel_all();
        self.scanner.reset();
        self.player.reset();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn document_id(&self) -> Option<&DocumentId> {
        self.loaded.as_ref().and_then(|loaded| loaded.id.as_ref())
    }

    pub fn document_name(&self) -> Option<&str> {
        self.loaded.as_ref().map(|loaded| loaded.name.as_str())
    }

    pub fn page_count(&self) -> u32 {
        self.loaded
            .as_ref()
            .map_or(0, |loaded| loaded.text.page_count())
    }

    pub fn current_page(&self) -> u32 {
        self.loaded.as_ref().map_or(0, |loaded| loaded.current_page)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current_page: self.current_page(),
            total_pages: self.page_count(),
        }
    }

    /// Moves to `page`, clamped to the document, and returns the new page.
    pub fn go_to_page(&mut self, page: u32) -> u32 {
        let Some(loaded) = self.loaded.as_mut() else {
            return 0;
        };
        let page = page.clamp(1, loaded.text.page_count().max(1));
        loaded.current_page = page;
        loaded.current_section = section_index_for_page(&loaded.sections, page);
        page
    }

    pub fn next_page(&mut self) -> u32 {
        self.go_to_page(self.current_page().saturating_add(1))
    }

    pub fn prev_page(&mut self) -> u32 {
        self.go_to_page(self.current_page().saturating_sub(1))
    }

    pub fn sections(&self) -> &[SectionRange] {
        self.loaded
            .as_ref()
            .map(|loaded| loaded.sections.as_slice())
            .unwrap_or_default()
    }

    pub fn current_section(&self) -> Option<&SectionRange> {
        let loaded = self.loaded.as_ref()?;
        loaded.sections.get(loaded.current_section?)
    }

    pub fn section_title_for_page(&self, page: u32) -> &str {
        section_title_for_page(self.sections(), page)
    }

    pub fn filter_sections(&self, query: &str) -> Vec<(usize, &SectionRange)> {
        filter_sections(self.sections(), query)
    }

    pub fn raw_text(&mut self, page: u32) -> String {
        self.loaded
            .as_mut()
            .map(|loaded| loaded.text.raw_text(page).to_string())
            .unwrap_or_default()
    }

    pub fn cleaned_text(&mut self, page: u32) -> String {
        self.loaded
            .as_mut()
            .map(|loaded| loaded.text.cleaned_text(page).to_string())
            .unwrap_or_default()
    }

    /// Supersedes any running search and returns the token of the next one.
    pub fn cancel_search(&mut self) -> CancelToken {
        self.search_cancel.cancel();
        self.search_cancel = CancelToken::new();
        self.search_cancel.clone()
    }

    pub fn search(&mut self, query: &str) -> SearchOutcome {
        let cancel = self.cancel_search();
        self.search_with(query, &cancel)
    }

    pub fn search_with(&mut self, query: &str, cancel: &CancelToken) -> SearchOutcome {
        let Some(loaded) = self.loaded.as_mut() else {
            return SearchOutcome::default();
        };
        exact_search(
            &mut loaded.text,
            query,
            &self.settings.search,
            cancel,
            self.scheduler.as_ref(),
        )
    }

    pub fn ask(&mut self, question: &str) -> AskOutcome {
        let limits = ScanLimits::from_settings(&self.settings.ask);
        self.ask_with(question, limits)
    }

    pub fn ask_with(&mut self, question: &str, limits: ScanLimits) -> AskOutcome {
        let Some(loaded) = self.loaded.as_mut() else {
            return AskOutcome {
                hits: Vec::new(),
                done: true,
                scanned: 0..0,
            };
        };
        self.scanner.scan(
            &mut loaded.text,
            &loaded.sections,
            question,
            limits,
            self.scheduler.as_ref(),
        )
    }

    /// Marks whether a speech recognizer exists on this platform.
    pub fn set_recognizer_available(&mut self, available: bool) {
        self.push_to_talk = PushToTalk::new(available);
    }

    pub fn push_to_talk(&self) -> &PushToTalk {
        &self.push_to_talk
    }

    pub fn push_to_talk_mut(&mut self) -> &mut PushToTalk {
        &mut self.push_to_talk
    }

    /// Asks the question last heard by push-to-talk, if one is pending.
    pub fn ask_heard_question(&mut self) -> Option<AskOutcome> {
        let question = self.push_to_talk.take_question()?;
        Some(self.ask(&question))
    }

    pub fn player(&self) -> &SpeechPlayer {
        &self.player
    }

    pub fn read_progress(&self) -> Option<&ReadProgress> {
        self.player.progress()
    }

    /// Reinstates progress saved by an earlier run.
    pub fn restore_read_progress(&mut self, progress: Option<ReadProgress>) {
        self.player.set_progress(progress);
    }

    fn progress_matches(&self, page: u32, text: &str) -> bool {
        self.player.progress().is_some_and(|progress| {
            progress.page == page
                && progress.key == identity_key(text, self.settings.speech.identity_span)
                && progress.offset > 0
        })
    }

    /// Reads the current page, continuing where an earlier read of the same
    /// text stopped.
    pub fn read_current_page(&mut self, engine: &mut dyn SpeechEngine) -> anyhow::Result<Step> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(Step::Done);
        };
        let page = loaded.current_page;
        let text = loaded.text.cleaned_text(page).to_string();
        let resume = self.progress_matches(page, &text);
        let body = if text.is_empty() { NO_TEXT_MESSAGE } else { &text };
        self.player
            .speak(engine, body, ReadContext::new(page, "page"), resume)
    }

    /// Reads the first pages of the section holding the current page.
    pub fn read_current_section(&mut self, engine: &mut dyn SpeechEngine) -> anyhow::Result<Step> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(Step::Done);
        };
        let Some(section) = loaded
            .current_section
            .and_then(|index| loaded.sections.get(index))
            .cloned()
        else {
            return self.read_current_page(engine);
        };

        let max_pages = self.settings.speech.section_max_pages.max(1);
        let end = section.end.min(section.start + max_pages - 1);
        let mut combined = format!(
            "Section: {}. Pages {} to {}.",
            section.title, section.start, end
        );
        for page in section.start..=end {
            let text = loaded.text.cleaned_text(page);
            if !text.is_empty() {
                combined.push(' ');
                combined.push_str(text);
            }
            self.scheduler.yield_now();
        }

        self.player.speak(
            engine,
            combined.trim(),
            ReadContext::new(section.start, "section"),
            false,
        )
    }

    /// Reads a ranked hit's page from the top without moving the view.
    pub fn read_from_hit(
        &mut self,
        engine: &mut dyn SpeechEngine,
        page: u32,
    ) -> anyhow::Result<Step> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(Step::Done);
        };
        let text = loaded.text.cleaned_text(page);
        let body = if text.is_empty() { NO_TEXT_MESSAGE } else { text };
        let spoken = format!("Page {page}. {body}");
        self.player
            .speak(engine, &spoken, ReadContext::new(page, "best-place"), false)
    }

    /// Goes back to the page of the stored progress and reads it, from the
    /// stored offset when the page text is unchanged, else from the top.
    pub fn resume_reading(&mut self, engine: &mut dyn SpeechEngine) -> anyhow::Result<Step> {
        let Some(progress) = self.player.progress().cloned() else {
            return Ok(Step::Done);
        };
        if self.loaded.is_none() {
            return Ok(Step::Done);
        }

        let page = self.go_to_page(progress.page);
        let text = self.cleaned_text(page);
        let resume = page == progress.page && self.progress_matches(page, &text);
        let label = if progress.label.is_empty() {
            "page"
        } else {
            progress.label.as_str()
        };
        let body = if text.is_empty() { NO_TEXT_MESSAGE } else { &text };
        self.player
            .speak(engine, body, ReadContext::new(page, label), resume)
    }

    pub fn stop_reading(&mut self, engine: &mut dyn SpeechEngine, mode: StopMode) {
        self.player.stop(engine, mode);
    }

    pub fn handle_speech_event(
        &mut self,
        engine: &mut dyn SpeechEngine,
        ticket: ChunkTicket,
        event: SpeechEvent,
    ) -> anyhow::Result<Step> {
        self.player.handle_event(engine, ticket, event)
    }

    pub fn continue_reading(
        &mut self,
        engine: &mut dyn SpeechEngine,
        run: u64,
    ) -> anyhow::Result<Step> {
        self.player.continue_run(engine, run)
    }

    /// Starts a render of the current page, superseding earlier ones.
    pub fn begin_render(&mut self) -> Option<RenderTicket> {
        let page = self.loaded.as_ref()?.current_page;
        Some(self.render_gate.begin(page))
    }

    pub fn complete_render(
        &self,
        ticket: RenderTicket,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RenderOutcome> {
        if !self.render_gate.is_current(ticket) {
            return Ok(RenderOutcome::Superseded);
        }
        let loaded = self
            .loaded
            .as_ref()
            .context("no document is open")?;
        let bitmap = loaded
            .text
            .document()
            .render_page(ticket.page, target_width, max_height)?;
        Ok(self.render_gate.finish(ticket, bitmap))
    }

    pub fn render_current(
        &mut self,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RenderOutcome> {
        let ticket = self.begin_render().context("no document is open")?;
        self.complete_render(ticket, target_width, max_height)
    }
}
