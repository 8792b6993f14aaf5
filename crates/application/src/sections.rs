use poh_core::{OutlineNode, SectionRange};
use poh_engine::Document;

struct OutlineEntry {
    title: String,
    page: u32,
    level: usize,
}

/// Derives one contiguous page range per resolvable outline entry.
///
/// Entries are ordered by start page (stable, so outline order breaks ties)
/// and each range runs to the page before the next entry's start, or to the
/// last page. Entries whose destination does not resolve are skipped.
pub fn build_sections(document: &dyn Document) -> Vec<SectionRange> {
    let outline = match document.outline() {
        Ok(outline) => outline,
        Err(err) => {
            tracing::warn!("outline unreadable: {err:#}");
            return Vec::new();
        }
    };

    let page_count = document.page_count();
    let mut entries = Vec::new();
    collect_entries(document, &outline, 0, page_count, &mut entries);
    ranges_from_entries(entries, page_count)
}

fn collect_entries(
    document: &dyn Document,
    nodes: &[OutlineNode],
    level: usize,
    page_count: u32,
    out: &mut Vec<OutlineEntry>,
) {
    for node in nodes {
        let title = match node.title.trim() {
            "" => "(Untitled)".to_string(),
            title => title.to_string(),
        };

        let page = match &node.dest {
            Some(dest) => match document.resolve_destination(dest) {
                Ok(page) => page,
                Err(err) => {
                    tracing::debug!("outline entry {title:?} did not resolve: {err:#}");
                    None
                }
            },
            None => None,
        };

        if let Some(page) = page.filter(|page| (1..=page_count).contains(page)) {
            out.push(OutlineEntry { title, page, level });
        }

        collect_entries(document, &node.children, level + 1, page_count, out);
    }
}

fn ranges_from_entries(mut entries: Vec<OutlineEntry>, page_count: u32) -> Vec<SectionRange> {
    entries.sort_by_key(|entry| entry.page);

    let starts: Vec<u32> = entries.iter().map(|entry| entry.page).collect();
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let end = match starts.get(i + 1) {
                Some(next) => next.saturating_sub(1),
                None => page_count,
            };
            SectionRange {
                title: entry.title,
                start: entry.page,
                end: end.max(entry.page),
                level: entry.level,
            }
        })
        .collect()
}

/// Index of the first range containing `page`.
pub fn section_index_for_page(sections: &[SectionRange], page: u32) -> Option<usize> {
    sections.iter().position(|section| section.contains(page))
}

pub fn section_title_for_page(sections: &[SectionRange], page: u32) -> &str {
    section_index_for_page(sections, page)
        .map(|i| sections[i].title.as_str())
        .unwrap_or_default()
}

/// Case-insensitive title filter; a blank query keeps every section.
pub fn filter_sections<'a>(
    sections: &'a [SectionRange],
    query: &str,
) -> Vec<(usize, &'a SectionRange)> {
    let query = query.trim().to_lowercase();
    sections
        .iter()
        .enumerate()
        .filter(|(_, section)| query.is_empty() || section.title.to_lowercase().contains(&query))
        .collect()
}
