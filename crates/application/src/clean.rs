use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Header/footer stamps that manuals repeat on every page.
    static ref BOILERPLATE: Vec<Regex> = [
        r"(?i)\bissued\b\s*[:\-]?\s*[a-z]{3,9}\s+\d{1,2},\s+\d{4}",
        r"(?i)\brevision\b\s*\d+\s*[:\-]?\s*[a-z]{3,9}\s+\d{1,2},\s+\d{4}",
        r"(?i)\brevision\b\s*[:\-]?\s*\d{1,3}",
        r"(?i)\brev\.?\b\s*[:\-]?\s*\d{1,3}",
        r"(?i)\breport\s*(no|number)\b\s*[:\-]?\s*[0-9a-z\-/. ]{1,20}",
        r"(?i)\bdoc(ument)?\s*(no|number)\b\s*[:\-]?\s*[0-9a-z\-/. ]{1,25}",
        r"(?i)\beffective\s*date\b\s*[:\-]?\s*[0-9a-z.,/ ]{1,25}",
        r"(?i)\bprint(ed)?\s*date\b\s*[:\-]?\s*[0-9a-z.,/ ]{1,25}",
        r"(?i)\bpage\s+\d+\s*(of\s+\d+)?\b",
        r"\b\d{1,4}\s*[-–]\s*\d{1,4}\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("boilerplate pattern"))
    .collect();
}

/// Strips revision stamps, document numbers, page footers and page ranges so
/// that speech does not read them aloud. Whitespace is collapsed to single
/// spaces and the result is trimmed.
pub fn clean_tts_text(text: &str) -> String {
    let mut cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return cleaned;
    }
    for pattern in BOILERPLATE.iter() {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
