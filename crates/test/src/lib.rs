//! Test helpers and fixtures.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use poh_application::{
    ChunkTicket, Scheduler, Session, SpeechEngine, SpeechEvent, Step, Utterance,
};
use poh_core::{Destination, OutlineNode, Settings, TextFragment, Voice};
use poh_engine::{Document, RgbaBitmap};

/// Defaults without the load retry delay.
pub fn make_settings() -> Settings {
    let mut settings = Settings::default();
    settings.load.retry_delay_ms = 0;
    settings
}

pub fn make_session(scheduler: Arc<ManualScheduler>) -> Session {
    Session::new(make_settings(), scheduler)
}

/// Lays out `text` one line per fragment, top to bottom.
pub fn page_fragments(text: &str) -> Vec<TextFragment> {
    text.lines()
        .enumerate()
        .map(|(i, line)| TextFragment::new(line, 72.0, 720.0 - 14.0 * i as f32))
        .collect()
}

/// In-memory document with per-page fragments and an optional outline.
pub struct FakeDocument {
    pages: Vec<Vec<TextFragment>>,
    outline: Vec<OutlineNode>,
    named: HashMap<String, u32>,
    broken_pages: Vec<u32>,
    extractions: Rc<Cell<usize>>,
}

impl FakeDocument {
    pub fn from_texts(pages: &[&str]) -> Self {
        Self::from_fragments(pages.iter().map(|text| page_fragments(text)).collect())
    }

    pub fn from_fragments(pages: Vec<Vec<TextFragment>>) -> Self {
        Self {
            pages,
            outline: Vec::new(),
            named: HashMap::new(),
            broken_pages: Vec::new(),
            extractions: Rc::new(Cell::new(0)),
        }
    }

    /// `count` pages of filler text.
    pub fn blank_pages(count: usize) -> Self {
        Self::from_fragments((0..count).map(|_| Vec::new()).collect())
    }

    pub fn with_page_text(mut self, page: u32, text: &str) -> Self {
        if let Some(slot) = self.pages.get_mut(page as usize - 1) {
            *slot = page_fragments(text);
        }
        self
    }

    pub fn with_outline(mut self, outline: Vec<OutlineNode>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_named_destination(mut self, name: &str, page: u32) -> Self {
        self.named.insert(name.to_string(), page);
        self
    }

    /// Extraction of `page` fails.
    pub fn with_broken_page(mut self, page: u32) -> Self {
        self.broken_pages.push(page);
        self
    }

    /// Shared count of `text_fragments` calls, readable after the document
    /// has been handed to a session.
    pub fn extractions(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.extractions)
    }

    pub fn boxed(self) -> Box<dyn Document> {
        Box::new(self)
    }
}

impl Document for FakeDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn text_fragments(&self, page: u32) -> anyhow::Result<Vec<TextFragment>> {
        self.extractions.set(self.extractions.get() + 1);
        anyhow::ensure!(!self.broken_pages.contains(&page), "page {page} is damaged");
        self.pages
            .get((page as usize).wrapping_sub(1))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no page {page}"))
    }

    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>> {
        Ok(self.outline.clone())
    }

    fn resolve_destination(&self, dest: &Destination) -> anyhow::Result<Option<u32>> {
        Ok(match dest {
            Destination::PageIndex(index) => Some(index + 1).filter(|p| *p <= self.page_count()),
            Destination::Named(name) => self.named.get(name).copied(),
            Destination::Ref { .. } => None,
        })
    }

    /// A single white row as wide as requested.
    fn render_page(
        &self,
        page: u32,
        target_width: i32,
        _max_height: i32,
    ) -> anyhow::Result<RgbaBitmap> {
        anyhow::ensure!(page >= 1 && page <= self.page_count(), "no page {page}");
        let width = target_width.max(1) as usize;
        Ok(RgbaBitmap {
            width,
            height: 1,
            stride: width * 4,
            pixels: vec![255; width * 4],
        })
    }
}

/// Outline entry pointing at a 1-based page.
pub fn outline_entry(title: &str, page: u32) -> OutlineNode {
    OutlineNode::leaf(title, Some(Destination::PageIndex(page - 1)))
}

/// Clock that only moves when told to, or by `tick` on every read.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    tick: Cell<Duration>,
    yields: Cell<usize>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `now()` call advances the clock by `tick` first.
    pub fn with_tick(tick: Duration) -> Arc<Self> {
        let scheduler = Self::default();
        scheduler.tick.set(tick);
        Arc::new(scheduler)
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn yields(&self) -> usize {
        self.yields.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.advance(self.tick.get());
        self.now.get()
    }

    fn yield_now(&self) {
        self.yields.set(self.yields.get() + 1);
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

/// Speech engine that records utterances and never produces sound.
#[derive(Default)]
pub struct RecordingSpeech {
    pub voices: Vec<Voice>,
    pub spoken: Vec<Utterance>,
    pub cancels: usize,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    pub fn last_ticket(&self) -> Option<ChunkTicket> {
        self.spoken.last().map(|utterance| utterance.ticket)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.spoken.iter().map(|u| u.text.as_str()).collect()
    }
}

impl SpeechEngine for RecordingSpeech {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: Utterance) -> anyhow::Result<()> {
        self.spoken.push(utterance);
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}

/// Completes the chunk in flight, as the engine would.
pub fn finish_chunk(session: &mut Session, engine: &mut RecordingSpeech) -> anyhow::Result<Step> {
    let ticket = engine
        .last_ticket()
        .ok_or_else(|| anyhow::anyhow!("nothing spoken yet"))?;
    session.handle_speech_event(engine, ticket, SpeechEvent::Started)?;
    session.handle_speech_event(engine, ticket, SpeechEvent::Ended)
}

/// Completes chunks until the run ends.
pub fn finish_run(session: &mut Session, engine: &mut RecordingSpeech) -> anyhow::Result<()> {
    for _ in 0..10_000 {
        if finish_chunk(session, engine)? == Step::Done {
            return Ok(());
        }
    }
    anyhow::bail!("run did not finish")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_document_counts_extractions() -> anyhow::Result<()> {
        let doc = FakeDocument::from_texts(&["one\ntwo", ""]).with_broken_page(2);
        let counter = doc.extractions();
        assert_eq!(doc.text_fragments(1)?.len(), 2);
        assert!(doc.text_fragments(2).is_err());
        assert!(doc.text_fragments(3).is_err());
        assert_eq!(counter.get(), 3);
        Ok(())
    }

    #[test]
    fn manual_scheduler_ticks_on_read() {
        let scheduler = ManualScheduler::with_tick(Duration::from_millis(5));
        assert_eq!(scheduler.now(), Duration::from_millis(5));
        scheduler.sleep(Duration::from_millis(10));
        assert_eq!(scheduler.now(), Duration::from_millis(20));
        assert_eq!(scheduler.sleeps(), vec![Duration::from_millis(10)]);
    }
}
