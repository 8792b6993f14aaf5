use poh_core::Voice;

/// Names kept in the voice menu even when their language is not English,
/// in menu order.
const PREFERRED_NAMES: &[&str] = &[
    "daniel", "samantha", "alex", "karen", "moira", "tessa", "serena", "oliver", "thomas",
    "arthur", "rishi", "george",
];

const QUALITY_MARKERS: &[&str] = &["enhanced", "premium", "neural", "natural"];

/// The voice for the next run: the explicitly selected one if the platform
/// has it, else the best voice for `lang`, else the first voice.
pub fn pick_voice(voices: &[Voice], selected: Option<&str>, lang: &str) -> Option<Voice> {
    if let Some(name) = selected
        && let Some(voice) = voices.iter().find(|voice| voice.name == name)
    {
        return Some(voice.clone());
    }

    let lang = lang.to_lowercase();
    let matching: Vec<&Voice> = voices
        .iter()
        .filter(|voice| voice.lang.to_lowercase().starts_with(&lang))
        .collect();
    let pool = if matching.is_empty() {
        voices.iter().collect()
    } else {
        matching
    };

    let prefer = |markers: &[&str]| {
        pool.iter().copied().find(|voice| {
            let name = voice.name.to_lowercase();
            markers.iter().any(|marker| name.contains(marker))
        })
    };
    prefer(&["siri"])
        .or_else(|| prefer(QUALITY_MARKERS))
        .or_else(|| pool.first().copied())
        .cloned()
}

/// German if the text has umlauts or sharp s, English otherwise.
pub fn guess_lang(text: &str) -> &'static str {
    if text.chars().any(|c| "äöüßÄÖÜ".contains(c)) {
        "de"
    } else {
        "en"
    }
}

/// Target language for `text`: German text overrides the configured one.
pub fn speech_lang<'a>(text: &str, configured: &'a str) -> &'a str {
    match guess_lang(text) {
        "de" => "de",
        _ => configured,
    }
}

/// English voices plus the named fallbacks: preferred names first, then
/// en-GB, then alphabetical.
pub fn voice_menu(voices: &[Voice]) -> Vec<Voice> {
    let rank = |voice: &Voice| PREFERRED_NAMES.iter().position(|n| *n == voice.name.to_lowercase());
    let is_gb = |voice: &Voice| voice.lang.to_lowercase().starts_with("en-gb");

    let mut menu: Vec<Voice> = voices
        .iter()
        .filter(|voice| voice.lang.to_lowercase().starts_with("en-") || rank(voice).is_some())
        .cloned()
        .collect();
    menu.sort_by(|a, b| match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => is_gb(b)
            .cmp(&is_gb(a))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
    });
    menu
}

/// Initial menu selection: British Daniel, any Daniel, or the best English
/// voice.
pub fn default_voice(voices: &[Voice]) -> Option<Voice> {
    let menu = voice_menu(voices);
    let daniel = |gb_only: bool| {
        menu.iter().find(|voice| {
            voice.name.eq_ignore_ascii_case("daniel")
                && (!gb_only || voice.lang.to_lowercase().starts_with("en-gb"))
        })
    };
    daniel(true)
        .or_else(|| daniel(false))
        .cloned()
        .or_else(|| pick_voice(voices, None, "en"))
}
