use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Duration;

use poh_core::{AskHit, AskSettings, SectionRange};

use crate::scheduler::Scheduler;
use crate::sections::section_title_for_page;
use crate::text::{PageTextCache, char_window, find_chars, fold_case};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "of", "in", "on", "for", "with", "at", "from", "by", "is",
    "are", "was", "were", "be", "been", "it", "this", "that", "these", "those", "as", "i", "you",
    "we", "they", "my", "your", "our", "their", "me", "us", "them", "what", "where", "when", "why",
    "how", "which", "who", "can", "could", "should", "would", "do", "does", "did",
];

/// Lower-cased alphanumeric words of `question`, minus stopwords, at most
/// `max_tokens` of them.
pub fn tokenize_question(question: &str, max_tokens: usize) -> Vec<String> {
    let lowered: String = question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .take(max_tokens)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub time_budget: Duration,
    pub max_results: usize,
}

impl ScanLimits {
    pub fn from_settings(settings: &AskSettings) -> Self {
        Self {
            time_budget: Duration::from_millis(settings.time_budget_ms),
            max_results: settings.max_results,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AskOutcome {
    pub hits: Vec<AskHit>,
    /// Every page has been scored for this question.
    pub done: bool,
    /// Pages scored by this call.
    pub scanned: Range<u32>,
}

impl AskOutcome {
    fn finished() -> Self {
        Self {
            hits: Vec::new(),
            done: true,
            scanned: 0..0,
        }
    }
}

struct ScanState {
    key: String,
    tokens: Vec<Vec<char>>,
    next_page: u32,
    results: Vec<AskHit>,
    title_scores: BTreeMap<u32, u32>,
}

impl ScanState {
    fn seed(key: String, tokens: &[String], sections: &[SectionRange], boost: u32) -> Self {
        let mut title_scores: BTreeMap<u32, u32> = BTreeMap::new();
        for section in sections {
            let title = section.title.to_lowercase();
            let score = tokens
                .iter()
                .filter(|token| title.contains(token.as_str()))
                .count() as u32
                * boost;
            if score > 0 {
                *title_scores.entry(section.start).or_default() += score;
            }
        }

        let results = title_scores
            .iter()
            .map(|(&page, &score)| AskHit {
                page,
                score,
                excerpt: String::new(),
                section_title: section_title_for_page(sections, page).to_string(),
            })
            .collect();

        Self {
            key,
            tokens: tokens.iter().map(|token| token.chars().collect()).collect(),
            next_page: 1,
            results,
            title_scores,
        }
    }
}

/// Time-boxed keyword ranking that picks up where the previous call with the
/// same question stopped.
pub struct AskScanner {
    settings: AskSettings,
    state: Option<ScanState>,
}

impl AskScanner {
    pub fn new(settings: AskSettings) -> Self {
        Self {
            settings,
            state: None,
        }
    }

    pub fn set_settings(&mut self, settings: AskSettings) {
        self.settings = settings;
        self.state = None;
    }

    /// Forgets any partial scan, e.g. when the document changes.
    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn question_key(&self) -> Option<&str> {
        self.state.as_ref().map(|state| state.key.as_str())
    }

    pub fn next_page(&self) -> Option<u32> {
        self.state.as_ref().map(|state| state.next_page)
    }

    pub fn scan(
        &mut self,
        text: &mut PageTextCache,
        sections: &[SectionRange],
        question: &str,
        limits: ScanLimits,
        scheduler: &dyn Scheduler,
    ) -> AskOutcome {
        let tokens = tokenize_question(question, self.settings.max_tokens);
        if tokens.is_empty() {
            return AskOutcome::finished();
        }

        let key = tokens.join("|");
        if self.state.as_ref().is_none_or(|state| state.key != key) {
            self.state = Some(ScanState::seed(
                key,
                &tokens,
                sections,
                self.settings.title_boost,
            ));
        }
        let settings = &self.settings;
        let Some(state) = self.state.as_mut() else {
            return AskOutcome::finished();
        };

        let page_count = text.page_count();
        let yield_every = settings.yield_every.max(1);
        let first = state.next_page;
        let started = scheduler.now();

        while state.next_page <= page_count {
            let page = state.next_page;
            state.next_page += 1;

            let raw = text.raw_text(page);
            if !raw.is_empty() {
                let folded = fold_case(raw);
                let token_score = count_token_hits(&folded, &state.tokens, settings.hit_cap);
                let boost = state.title_scores.get(&page).copied().unwrap_or(0);

                if token_score > 0 || boost > 0 {
                    let earliest = state
                        .tokens
                        .iter()
                        .filter_map(|token| {
                            find_chars(&folded, token, 0).map(|at| (at, token.len()))
                        })
                        .min_by_key(|&(at, _)| at);
                    let excerpt = match earliest {
                        Some((at, len)) => {
                            let chars: Vec<char> = raw.chars().collect();
                            let window = settings.excerpt_window;
                            char_window(&chars, at, len, window, window)
                                .trim()
                                .to_string()
                        }
                        None => String::new(),
                    };

                    state.results.push(AskHit {
                        page,
                        score: token_score * settings.token_weight + boost,
                        excerpt,
                        section_title: section_title_for_page(sections, page).to_string(),
                    });
                }
            }

            if page % yield_every == 0 {
                scheduler.yield_now();
            }
            if scheduler.now().saturating_sub(started) > limits.time_budget {
                break;
            }
        }

        let done = state.next_page > page_count;
        let hits = rank(&state.results, limits.max_results, settings.dedup_radius);
        tracing::debug!(
            "ask {:?}: scanned pages {}..{}, {} candidates, done={done}",
            state.key,
            first,
            state.next_page,
            state.results.len()
        );

        AskOutcome {
            hits,
            done,
            scanned: first..state.next_page,
        }
    }
}

/// Non-overlapping occurrences of every token, capped at `cap`.
fn count_token_hits(folded: &[char], tokens: &[Vec<char>], cap: u32) -> u32 {
    let mut hits = 0;
    for token in tokens {
        let mut from = 0;
        while let Some(at) = find_chars(folded, token, from) {
            hits += 1;
            if hits >= cap {
                return cap;
            }
            from = at + token.len();
        }
    }
    hits
}

/// Best score first, skipping anything within `radius` pages of a pick.
fn rank(results: &[AskHit], max_results: usize, radius: u32) -> Vec<AskHit> {
    let mut sorted: Vec<&AskHit> = results.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let mut picked: Vec<AskHit> = Vec::new();
    for hit in sorted {
        if picked.len() >= max_results {
            break;
        }
        if picked
            .iter()
            .any(|chosen| chosen.page.abs_diff(hit.page) <= radius)
        {
            continue;
        }
        picked.push(hit.clone());
    }
    picked
}
