//! Reader behaviour: text extraction, cleaning, ranking, search, speech and
//! the session that ties them to one loaded document.

mod ask;
mod clean;
mod feedback;
mod push_to_talk;
mod render;
mod scheduler;
mod search;
mod sections;
mod session;
mod speech;
mod text;
mod voices;

pub use ask::{AskOutcome, AskScanner, ScanLimits, tokenize_question};
pub use clean::clean_tts_text;
pub use feedback::feedback_report;
pub use push_to_talk::{MIC_READY, PushToTalk, SpeechRecognizer};
pub use render::{RenderGate, RenderOutcome, RenderTicket};
pub use scheduler::{Scheduler, SystemScheduler};
pub use search::{CancelToken, SearchOutcome, exact_search};
pub use sections::{
    build_sections, filter_sections, section_index_for_page, section_title_for_page,
};
pub use session::{NO_TEXT_MESSAGE, Session};
pub use speech::{
    Chunk, ChunkTicket, PlayerState, ReadContext, SpeechEngine, SpeechEvent, SpeechPlayer, Step,
    StopMode, Utterance, chunk_text, identity_key, is_transient_interruption,
};
pub use text::{PageTextCache, reading_order_text};
pub use voices::{default_voice, guess_lang, pick_voice, speech_lang, voice_menu};
