/// Platform speech recognition, driven hold-to-talk.
pub trait SpeechRecognizer {
    /// Asks for microphone access; false when denied.
    fn request_permission(&mut self) -> bool;
    fn start(&mut self) -> anyhow::Result<()>;
    fn stop(&mut self) -> anyhow::Result<()>;
}

pub const MIC_READY: &str = "Mic ready. Hold to talk.";

/// Status line and pending question for the hold-to-talk button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushToTalk {
    available: bool,
    holding: bool,
    status: String,
    question: Option<String>,
}

impl PushToTalk {
    pub fn new(available: bool) -> Self {
        let status = if available {
            MIC_READY
        } else {
            "Speech recognition is not available."
        };
        Self {
            available,
            holding: false,
            status: status.to_string(),
            question: None,
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn press(&mut self, recognizer: &mut dyn SpeechRecognizer) {
        if self.holding || !self.available {
            return;
        }
        if !recognizer.request_permission() {
            self.status = "Mic permission denied.".to_string();
            return;
        }
        self.holding = true;
        self.status = "Listening…".to_string();
        // Some platforms refuse to start while a session is winding down.
        if let Err(err) = recognizer.start() {
            tracing::debug!("recognizer start ignored: {err:#}");
        }
    }

    pub fn release(&mut self, recognizer: &mut dyn SpeechRecognizer) {
        if !self.holding {
            return;
        }
        self.holding = false;
        if let Err(err) = recognizer.stop() {
            tracing::debug!("recognizer stop ignored: {err:#}");
        }
    }

    /// Feeds the transcript segments of one recognition result.
    pub fn on_result(&mut self, segments: &[&str], is_final: bool) {
        let transcript = segments.concat();
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        if is_final {
            self.status = format!("Heard: \"{transcript}\"");
            self.question = Some(transcript.to_string());
        } else {
            self.status = format!("Listening… \"{transcript}\"");
        }
    }

    pub fn on_end(&mut self) {
        self.status = MIC_READY.to_string();
    }

    pub fn on_error(&mut self, kind: &str) {
        let kind = if kind.trim().is_empty() { "unknown" } else { kind.trim() };
        self.status = format!("Mic error: {kind}");
    }

    /// The last final transcript, once.
    pub fn take_question(&mut self) -> Option<String> {
        self.question.take()
    }
}
