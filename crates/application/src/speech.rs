use std::collections::VecDeque;
use std::time::Duration;

use poh_core::{ReadProgress, SpeechSettings, Voice};

use crate::voices::{pick_voice, speech_lang};

/// `len:head:tail` fingerprint, counted in chars, used to check that stored
/// progress still refers to the same text.
pub fn identity_key(text: &str, span: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars.iter().take(span).collect();
    let tail: String = chars[chars.len().saturating_sub(span)..].iter().collect();
    format!("{}:{head}:{tail}", chars.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Char span of the chunk in the text it was cut from.
    pub start: usize,
    pub end: usize,
    /// The span with surrounding whitespace trimmed.
    pub text: String,
}

/// Cuts `text` into spans of at most `max_len` chars, breaking at the last
/// space before the limit unless that space sits within `min_break` chars of
/// the span start.
pub fn chunk_text(text: &str, max_len: usize, min_break: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let Some(mut start) = chars.iter().position(|c| !c.is_whitespace()) else {
        return Vec::new();
    };
    let len = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(0, |last| last + 1);
    let max_len = max_len.max(1);

    let mut chunks = Vec::new();
    while start < len {
        let mut end = (start + max_len).min(len);
        if end < len
            && let Some(space) = chars[..=end].iter().rposition(|&c| c == ' ')
            && space > start + min_break
        {
            end = space;
        }

        let span: String = chars[start..end].iter().collect();
        let trimmed = span.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                start,
                end,
                text: trimmed.to_string(),
            });
        }
        start = end;
    }
    chunks
}

/// Moves an offset that lands inside a word back to that word's first char.
fn snap_to_word_start(chars: &[char], offset: usize) -> usize {
    let mut offset = offset.min(chars.len());
    if offset < chars.len() && !chars[offset].is_whitespace() {
        while offset > 0 && !chars[offset - 1].is_whitespace() {
            offset -= 1;
        }
    }
    offset
}

pub fn is_transient_interruption(kind: &str) -> bool {
    matches!(
        kind.trim().to_ascii_lowercase().as_str(),
        "interrupted" | "canceled" | "cancelled"
    )
}

/// Identifies one chunk of one run. Engines echo it back with every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTicket {
    pub run: u64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub ticket: ChunkTicket,
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
}

/// Platform speech synthesis.
pub trait SpeechEngine {
    /// May be empty while the platform is still loading voices.
    fn voices(&self) -> Vec<Voice>;

    /// Starts one utterance. Its lifecycle comes back as `SpeechEvent`s
    /// tagged with the utterance ticket.
    fn speak(&mut self, utterance: Utterance) -> anyhow::Result<()>;

    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Speaking,
    Finished,
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    KeepProgress,
    Discard,
}

/// What the driver of the player has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep feeding engine events.
    Wait,
    /// Call `continue_run` for the given run after the delay.
    RetryAfter(Duration),
    /// The run is over.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadContext {
    pub page: u32,
    pub label: String,
}

impl ReadContext {
    pub fn new(page: u32, label: impl Into<String>) -> Self {
        Self {
            page,
            label: label.into(),
        }
    }
}

struct ActiveRun {
    id: u64,
    chunks: VecDeque<Chunk>,
    current: Option<(usize, Chunk)>,
    next_index: usize,
    voice: Option<Voice>,
    rate: f32,
}

/// Speaks text one chunk at a time and remembers how far it got.
pub struct SpeechPlayer {
    settings: SpeechSettings,
    state: PlayerState,
    run_id: u64,
    run: Option<ActiveRun>,
    progress: Option<ReadProgress>,
}

impl SpeechPlayer {
    pub fn new(settings: SpeechSettings) -> Self {
        Self {
            settings,
            state: PlayerState::Idle,
            run_id: 0,
            run: None,
            progress: None,
        }
    }

    pub fn settings(&self) -> &SpeechSettings {
        &self.settings
    }

    /// Voice and rate changes apply from the next `speak`.
    pub fn set_settings(&mut self, settings: SpeechSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.run.is_some()
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn progress(&self) -> Option<&ReadProgress> {
        self.progress.as_ref()
    }

    pub fn set_progress(&mut self, progress: Option<ReadProgress>) {
        self.progress = progress;
    }

    pub fn can_resume(&self) -> bool {
        self.progress.as_ref().is_some_and(ReadProgress::can_resume)
    }

    /// Drops the run and the progress without touching the engine. Used when
    /// the document goes away.
    pub fn reset(&mut self) {
        self.run_id += 1;
        self.run = None;
        self.progress = None;
        self.state = PlayerState::Idle;
    }

    /// Starts a new run over `text`, superseding any run in flight.
    ///
    /// With `resume`, a stored progress for the same page and identity key
    /// restarts from its offset; anything else starts at the beginning.
    pub fn speak(
        &mut self,
        engine: &mut dyn SpeechEngine,
        text: &str,
        context: ReadContext,
        resume: bool,
    ) -> anyhow::Result<Step> {
        self.run_id += 1;
        if self.run.take().is_some() {
            engine.cancel();
        }

        let text = text.trim();
        if text.is_empty() {
            self.state = PlayerState::Idle;
            return Ok(Step::Done);
        }

        let chars: Vec<char> = text.chars().collect();
        let key = identity_key(text, self.settings.identity_span);
        // A run that already reached the end starts over.
        let offset = match &self.progress {
            Some(progress)
                if resume
                    && progress.page == context.page
                    && progress.key == key
                    && progress.offset < chars.len() =>
            {
                snap_to_word_start(&chars, progress.offset)
            }
            _ => 0,
        };

        let remaining: String = chars[offset..].iter().collect();
        let chunks: VecDeque<Chunk> =
            chunk_text(&remaining, self.settings.max_chunk_len, self.settings.min_break)
                .into_iter()
                .map(|chunk| Chunk {
                    start: chunk.start + offset,
                    end: chunk.end + offset,
                    text: chunk.text,
                })
                .collect();
        if chunks.is_empty() {
            self.state = PlayerState::Finished;
            return Ok(Step::Done);
        }

        tracing::info!(
            "reading {} {} from offset {offset} in {} chunks",
            context.label,
            context.page,
            chunks.len()
        );

        let voice = pick_voice(
            &engine.voices(),
            self.settings.voice.as_deref(),
            speech_lang(text, &self.settings.lang),
        );
        self.progress = Some(ReadProgress {
            page: context.page,
            key,
            offset,
            label: context.label,
            started: false,
        });
        self.run = Some(ActiveRun {
            id: self.run_id,
            chunks,
            current: None,
            next_index: 0,
            voice,
            rate: self.settings.rate,
        });
        self.state = PlayerState::Speaking;
        self.speak_next(engine)
    }

    /// Applies one engine event. Events for superseded runs or chunks are
    /// ignored.
    pub fn handle_event(
        &mut self,
        engine: &mut dyn SpeechEngine,
        ticket: ChunkTicket,
        event: SpeechEvent,
    ) -> anyhow::Result<Step> {
        if ticket.run != self.run_id {
            tracing::debug!("ignoring {event:?} from stale run {}", ticket.run);
            return Ok(Step::Wait);
        }
        let chunk_end = match self.run.as_ref().and_then(|run| run.current.as_ref()) {
            Some((index, chunk)) if *index == ticket.index => chunk.end,
            _ => return Ok(Step::Wait),
        };

        match event {
            SpeechEvent::Started => {
                if let Some(progress) = self.progress.as_mut() {
                    progress.started = true;
                    if progress.offset == 0 {
                        progress.offset = 1;
                    }
                }
                Ok(Step::Wait)
            }
            SpeechEvent::Ended => {
                self.finish_chunk(chunk_end);
                self.speak_next(engine)
            }
            SpeechEvent::Error(kind) if is_transient_interruption(&kind) => {
                tracing::debug!("speech {kind} mid-chunk, continuing");
                self.finish_chunk(chunk_end);
                Ok(Step::RetryAfter(Duration::from_millis(
                    self.settings.transient_retry_ms,
                )))
            }
            SpeechEvent::Error(kind) => {
                tracing::warn!("speech engine error: {kind}");
                self.run = None;
                self.state = PlayerState::Failed(kind);
                Ok(Step::Done)
            }
        }
    }

    /// Speaks the next chunk of `run` after a `Step::RetryAfter`.
    pub fn continue_run(
        &mut self,
        engine: &mut dyn SpeechEngine,
        run: u64,
    ) -> anyhow::Result<Step> {
        match &self.run {
            Some(active) if active.id == run && run == self.run_id => {
                if active.current.is_some() {
                    Ok(Step::Wait)
                } else {
                    self.speak_next(engine)
                }
            }
            _ => Ok(Step::Done),
        }
    }

    pub fn stop(&mut self, engine: &mut dyn SpeechEngine, mode: StopMode) {
        self.run_id += 1;
        if self.run.take().is_some() {
            self.state = PlayerState::Stopped;
        }
        engine.cancel();
        if mode == StopMode::Discard {
            self.progress = None;
        }
    }

    fn finish_chunk(&mut self, end: usize) {
        if let Some(run) = self.run.as_mut() {
            run.current = None;
        }
        if let Some(progress) = self.progress.as_mut() {
            progress.offset = end;
        }
    }

    fn speak_next(&mut self, engine: &mut dyn SpeechEngine) -> anyhow::Result<Step> {
        let Some(run) = self.run.as_mut() else {
            return Ok(Step::Done);
        };
        let Some(chunk) = run.chunks.pop_front() else {
            self.run = None;
            self.state = PlayerState::Finished;
            return Ok(Step::Done);
        };

        let index = run.next_index;
        run.next_index += 1;
        let utterance = Utterance {
            ticket: ChunkTicket { run: run.id, index },
            text: chunk.text.clone(),
            voice: run.voice.clone(),
            rate: run.rate,
        };
        run.current = Some((index, chunk));

        if let Some(progress) = self.progress.as_mut()
            && progress.offset == 0
        {
            progress.offset = 1;
        }

        if let Err(err) = engine.speak(utterance) {
            self.run = None;
            self.state = PlayerState::Failed(err.to_string());
            return Err(err.context("speak chunk"));
        }
        Ok(Step::Wait)
    }
}
