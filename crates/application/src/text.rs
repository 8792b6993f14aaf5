use std::collections::HashMap;

use poh_core::TextFragment;
use poh_engine::Document;

use crate::clean::clean_tts_text;

/// Fragments whose baselines differ by at most this much share a line.
const SAME_LINE_TOLERANCE: f32 = 2.5;

/// Rebuilds visual reading order from positioned fragments: top to bottom,
/// then left to right, one output line per visual line.
pub fn reading_order_text(fragments: &[TextFragment]) -> String {
    let mut items: Vec<(String, f32, f32)> = fragments
        .iter()
        .filter_map(|frag| {
            let text = collapse_whitespace(&frag.text);
            (!text.is_empty()).then_some((text, frag.x, frag.y))
        })
        .collect();
    if items.is_empty() {
        return String::new();
    }

    items.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.1.total_cmp(&b.1)));

    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<(String, f32, f32)> = Vec::new();
    let mut current_y = items[0].2;
    for item in items {
        if (item.2 - current_y).abs() > SAME_LINE_TOLERANCE {
            lines.push(join_line(&mut current));
            current_y = item.2;
        }
        current.push(item);
    }
    if !current.is_empty() {
        lines.push(join_line(&mut current));
    }
    lines.join("\n")
}

fn join_line(line: &mut Vec<(String, f32, f32)>) -> String {
    line.sort_by(|a, b| a.1.total_cmp(&b.1));
    let joined = line
        .iter()
        .map(|(text, _, _)| text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    line.clear();
    joined
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cases char by char so that char offsets in the result line up with
/// the input.
pub(crate) fn fold_case(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

pub(crate) fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// `before` chars ahead of a match through `after` chars past its end.
pub(crate) fn char_window(
    chars: &[char],
    at: usize,
    len: usize,
    before: usize,
    after: usize,
) -> String {
    let start = at.saturating_sub(before).min(chars.len());
    let end = at.saturating_add(len).saturating_add(after).min(chars.len());
    chars[start..end.max(start)].iter().collect()
}

/// Per-document memo of raw and speech-cleaned page text.
///
/// Owning the document ties the memo's lifetime to it, so loading another
/// document always starts from an empty cache.
pub struct PageTextCache {
    document: Box<dyn Document>,
    raw: HashMap<u32, String>,
    cleaned: HashMap<u32, String>,
}

impl PageTextCache {
    pub fn new(document: Box<dyn Document>) -> Self {
        Self {
            document,
            raw: HashMap::new(),
            cleaned: HashMap::new(),
        }
    }

    pub fn document(&self) -> &dyn Document {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    /// Extracted text in reading order; empty for pages without text, out of
    /// range, or that fail to extract.
    pub fn raw_text(&mut self, page: u32) -> &str {
        if page == 0 || page > self.document.page_count() {
            return "";
        }
        let document = &self.document;
        self.raw
            .entry(page)
            .or_insert_with(|| match document.text_fragments(page) {
                Ok(fragments) => reading_order_text(&fragments),
                Err(err) => {
                    tracing::warn!("text extraction failed on page {page}: {err:#}");
                    String::new()
                }
            })
    }

    pub fn cleaned_text(&mut self, page: u32) -> &str {
        if !self.cleaned.contains_key(&page) {
            let cleaned = clean_tts_text(self.raw_text(page));
            self.cleaned.insert(page, cleaned);
        }
        self.cleaned.get(&page).map(String::as_str).unwrap_or_default()
    }

    pub fn cached_pages(&self) -> usize {
        self.raw.len()
    }
}
