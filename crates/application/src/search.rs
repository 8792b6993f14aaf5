use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use poh_core::{SearchHit, SearchSettings};

use crate::scheduler::Scheduler;
use crate::text::{PageTextCache, char_window, find_chars, fold_case};

/// Shared flag checked by a running search between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub cancelled: bool,
}

/// Case-insensitive substring scan over every page, first occurrence per page.
///
/// Cancellation is observed before each page; a cancelled search reports no
/// hits.
pub fn exact_search(
    text: &mut PageTextCache,
    query: &str,
    settings: &SearchSettings,
    cancel: &CancelToken,
    scheduler: &dyn Scheduler,
) -> SearchOutcome {
    let needle = fold_case(query.trim());
    if needle.is_empty() {
        return SearchOutcome::default();
    }

    let mut hits = Vec::new();
    for page in 1..=text.page_count() {
        if cancel.is_cancelled() {
            tracing::debug!("search for {query:?} cancelled at page {page}");
            return SearchOutcome {
                hits: Vec::new(),
                cancelled: true,
            };
        }

        let raw = text.raw_text(page);
        if !raw.is_empty() {
            let folded = fold_case(raw);
            if let Some(at) = find_chars(&folded, &needle, 0) {
                let chars: Vec<char> = raw.chars().collect();
                hits.push(SearchHit {
                    page,
                    context: char_window(
                        &chars,
                        at,
                        needle.len(),
                        settings.context_before,
                        settings.context_after,
                    ),
                });
                if hits.len() >= settings.max_hits {
                    break;
                }
            }
        }

        if page % settings.yield_every.max(1) == 0 {
            scheduler.yield_now();
        }
    }

    SearchOutcome {
        hits,
        cancelled: false,
    }
}
