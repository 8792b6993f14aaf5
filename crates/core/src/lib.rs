//! Core domain types for the POH reader.

use serde::{Deserialize, Serialize};

/// Synthetic library key built from a file's name, size and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn from_file_meta(name: &str, size: u64, last_modified_ms: i64) -> Self {
        Self(format!("{name}_{size}_{last_modified_ms}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A positioned run of text as reported by the document collaborator.
///
/// `y` grows upwards (PDF user space), so larger `y` means higher on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A named destination looked up in the document's name tree.
    Named(String),
    /// An indirect reference to a page object.
    Ref { id: u64, generation: u64 },
    /// A zero-based page index.
    PageIndex(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub title: String,
    pub dest: Option<Destination>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn leaf(title: impl Into<String>, dest: Option<Destination>) -> Self {
        Self {
            title: title.into(),
            dest,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }
}

/// One contiguous page range derived from an outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRange {
    pub title: String,
    pub start: u32,
    pub end: u32,
    pub level: usize,
}

impl SectionRange {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub page: u32,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskHit {
    pub page: u32,
    pub score: u32,
    pub excerpt: String,
    pub section_title: String,
}

/// Resume point for speech playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadProgress {
    pub page: u32,
    pub key: String,
    /// Offset into the spoken text, counted in chars.
    pub offset: usize,
    pub label: String,
    pub started: bool,
}

impl ReadProgress {
    pub fn can_resume(&self) -> bool {
        self.offset > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// A stored document without its bytes, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: DocumentId,
    pub name: String,
    pub size: u64,
    pub last_modified: i64,
    pub saved_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRecord {
    pub entry: LibraryEntry,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: u32,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.total_pages == 0 {
            f.write_str("Page: – / –")
        } else {
            write!(f, "Page: {} / {}", self.current_page, self.total_pages)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ask: AskSettings,
    pub search: SearchSettings,
    pub speech: SpeechSettings,
    pub load: LoadSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskSettings {
    pub time_budget_ms: u64,
    pub max_results: usize,
    pub yield_every: u32,
    pub excerpt_window: usize,
    pub token_weight: u32,
    pub title_boost: u32,
    pub dedup_radius: u32,
    pub hit_cap: u32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_hits: usize,
    pub context_before: usize,
    pub context_after: usize,
    pub yield_every: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub rate: f32,
    pub voice: Option<String>,
    pub lang: String,
    pub max_chunk_len: usize,
    pub min_break: usize,
    pub identity_span: usize,
    pub transient_retry_ms: u64,
    pub section_max_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub tries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub web_root: String,
}

impl Default for AskSettings {
    fn default() -> Self {
        Self {
            time_budget_ms: 1200,
            max_results: 7,
            yield_every: 12,
            excerpt_window: 140,
            token_weight: 2,
            title_boost: 6,
            dedup_radius: 1,
            hit_cap: 200,
            max_tokens: 10,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_hits: 60,
            context_before: 80,
            context_after: 120,
            yield_every: 12,
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            rate: 0.9,
            voice: None,
            lang: "en".to_string(),
            max_chunk_len: 220,
            min_break: 80,
            identity_span: 40,
            transient_retry_ms: 80,
            section_max_pages: 6,
        }
    }
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            tries: 3,
            retry_delay_ms: 250,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5173,
            web_root: "public".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ask: AskSettings::default(),
            search: SearchSettings::default(),
            speech: SpeechSettings::default(),
            load: LoadSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.ask.time_budget_ms = self.ask.time_budget_ms.clamp(1, 60_000);
        self.ask.max_results = self.ask.max_results.clamp(1, 100);
        self.ask.yield_every = self.ask.yield_every.max(1);
        self.ask.max_tokens = self.ask.max_tokens.clamp(1, 64);
        self.ask.hit_cap = self.ask.hit_cap.max(1);

        self.search.max_hits = self.search.max_hits.clamp(1, 10_000);
        self.search.yield_every = self.search.yield_every.max(1);

        self.speech.rate = if self.speech.rate.is_finite() {
            self.speech.rate.clamp(0.1, 4.0)
        } else {
            1.0
        };
        self.speech.voice = self
            .speech
            .voice
            .take()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        self.speech.lang = self.speech.lang.trim().to_ascii_lowercase();
        if self.speech.lang.is_empty() {
            self.speech.lang = "en".to_string();
        }
        self.speech.max_chunk_len = self.speech.max_chunk_len.clamp(20, 4000);
        self.speech.min_break = self.speech.min_break.min(self.speech.max_chunk_len - 1);
        self.speech.identity_span = self.speech.identity_span.max(1);
        self.speech.section_max_pages = self.speech.section_max_pages.max(1);

        self.load.tries = self.load.tries.clamp(1, 10);

        self.server.web_root = self.server.web_root.trim().to_string();
        if self.server.web_root.is_empty() {
            self.server.web_root = "public".to_string();
        }
    }

    /// Updates one setting from a dotted key such as `ask.time_budget_ms`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), &'static str> {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "ask.time_budget_ms" => self.ask.time_budget_ms = parse(value)?,
            "ask.max_results" => self.ask.max_results = parse(value)?,
            "ask.excerpt_window" => self.ask.excerpt_window = parse(value)?,
            "ask.token_weight" => self.ask.token_weight = parse(value)?,
            "ask.title_boost" => self.ask.title_boost = parse(value)?,
            "ask.dedup_radius" => self.ask.dedup_radius = parse(value)?,
            "search.max_hits" => self.search.max_hits = parse(value)?,
            "speech.rate" => self.speech.rate = parse(value)?,
            "speech.voice" => {
                self.speech.voice = (!value.is_empty()).then(|| value.to_string());
            }
            "speech.lang" => self.speech.lang = value.to_string(),
            "speech.section_max_pages" => self.speech.section_max_pages = parse(value)?,
            "load.tries" => self.load.tries = parse(value)?,
            "load.retry_delay_ms" => self.load.retry_delay_ms = parse(value)?,
            "server.port" => self.server.port = parse(value)?,
            "server.web_root" => self.server.web_root = value.to_string(),
            _ => return Err("unknown setting"),
        }
        self.normalize();
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, &'static str> {
    value.parse::<T>().map_err(|_| "invalid setting value")
}
