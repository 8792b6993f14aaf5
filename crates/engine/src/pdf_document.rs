use std::collections::HashMap;
use std::path::Path;

use anyhow::Context as _;
use pdf::file::{CachedFile, FileOptions};
use pdf::object::{
    Action, Dest, MaybeNamedDest, OutlineItem, PageTree, PagesNode, PlainRef, RcRef, Resolve,
};
use pdf::primitive::{PdfString, Primitive};
use poh_core::{Destination, OutlineNode, TextFragment};

use crate::pdfium::Renderer;
use crate::text_ops::ops_to_fragments;
use crate::{Document, RgbaBitmap};

/// A PDF loaded from an in-memory byte buffer.
pub struct PdfDocument {
    file: CachedFile<Vec<u8>>,
    bytes: Vec<u8>,
    page_count: u32,
    pages_by_ref: HashMap<PlainRef, u32>,
    dest_pages_by_name: HashMap<String, PlainRef>,
    renderer: Renderer,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("bytes", &self.bytes.len())
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let file = FileOptions::cached()
            .load(bytes.clone())
            .context("parse pdf bytes")?;
        let page_count = file.num_pages();

        let resolver = file.resolver();
        let catalog = file.get_root();

        let mut pages_by_ref: HashMap<PlainRef, u32> = HashMap::new();
        add_page_tree(&resolver, &mut pages_by_ref, &catalog.pages, &mut 1);

        let mut dest_pages_by_name: HashMap<String, PlainRef> = HashMap::new();
        if let Some(ref names) = catalog.names
            && let Some(ref dests) = names.dests
        {
            let walked = dests.walk(&resolver, &mut |key: &PdfString, val: &Option<Dest>| {
                if let Some(Dest {
                    page: Some(page), ..
                }) = val
                {
                    dest_pages_by_name.insert(key.to_string_lossy(), page.get_inner());
                }
            });
            if let Err(err) = walked {
                tracing::debug!("named destinations unreadable: {err}");
            }
        }
        drop(resolver);

        Ok(Self {
            file,
            bytes,
            page_count,
            pages_by_ref,
            dest_pages_by_name,
            renderer: Renderer::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("read pdf {}", path.display()))?;
        Self::from_bytes(bytes)
    }

    fn page_for_ref(&self, r: PlainRef) -> Option<u32> {
        self.pages_by_ref.get(&r).copied()
    }

    fn page_for_name(&self, name: &str) -> Option<u32> {
        let page_ref = self.dest_pages_by_name.get(name).copied()?;
        self.page_for_ref(page_ref)
    }
}

fn add_page_tree(
    r: &impl Resolve,
    pages: &mut HashMap<PlainRef, u32>,
    tree: &PageTree,
    next_page: &mut u32,
) {
    for &node_ref in &tree.kids {
        let node = match r.get(node_ref) {
            Ok(n) => n,
            Err(_) => continue,
        };
        match *node {
            PagesNode::Tree(ref tree) => add_page_tree(r, pages, tree, next_page),
            PagesNode::Leaf(_) => {
                pages.insert(node_ref.get_inner(), *next_page);
                *next_page += 1;
            }
        }
    }
}

fn ref_destination(r: PlainRef) -> Destination {
    Destination::Ref {
        id: r.id,
        generation: r.r#gen,
    }
}

fn destination_ref(id: u64, generation: u64) -> PlainRef {
    PlainRef {
        id,
        r#gen: generation,
    }
}

fn outline_destination(node: &OutlineItem) -> Option<Destination> {
    if let Some(ref dest) = node.dest {
        match dest {
            Primitive::String(s) => return Some(Destination::Named(s.to_string_lossy())),
            Primitive::Name(n) => return Some(Destination::Named(n.as_str().to_string())),
            Primitive::Array(a) => {
                if let Some(Primitive::Reference(r)) = a.first() {
                    return Some(ref_destination(*r));
                }
            }
            _ => {}
        }
    }

    match node.action.clone() {
        Some(Action::Goto(MaybeNamedDest::Named(s))) => {
            Some(Destination::Named(s.to_string_lossy()))
        }
        Some(Action::Goto(MaybeNamedDest::Direct(Dest { page: Some(p), .. }))) => {
            Some(ref_destination(p.get_inner()))
        }
        _ => None,
    }
}

/// Collects `node` and its following siblings, recursing into children.
fn walk_outline(r: &impl Resolve, mut node: RcRef<OutlineItem>, out: &mut Vec<OutlineNode>) {
    loop {
        let title = node
            .title
            .as_ref()
            .map(|t| t.to_string_lossy())
            .unwrap_or_default();

        let mut children = Vec::new();
        if let Some(entry_ref) = node.first
            && let Ok(entry) = r.get(entry_ref)
        {
            walk_outline(r, entry, &mut children);
        }

        out.push(OutlineNode {
            title,
            dest: outline_destination(&node),
            children,
        });

        match node.next.map(|next| r.get(next)) {
            Some(Ok(entry)) => node = entry,
            _ => break,
        }
    }
}

impl Document for PdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn text_fragments(&self, page: u32) -> anyhow::Result<Vec<TextFragment>> {
        anyhow::ensure!(
            page >= 1 && page <= self.page_count,
            "page {page} out of range 1..={}",
            self.page_count
        );
        let resolver = self.file.resolver();
        let pdf_page = self
            .file
            .get_page(page - 1)
            .with_context(|| format!("get pdf page {page}"))?;
        let resources = pdf_page.resources()?;
        let Some(content) = &pdf_page.contents else {
            return Ok(Vec::new());
        };
        let ops = content.operations(&resolver)?;
        Ok(ops_to_fragments(&ops, &resolver, resources))
    }

    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>> {
        let resolver = self.file.resolver();
        let catalog = self.file.get_root();

        let mut out = Vec::new();
        if let Some(ref outlines) = catalog.outlines
            && let Some(entry_ref) = outlines.first
        {
            let entry = resolver.get(entry_ref).context("read first outline item")?;
            walk_outline(&resolver, entry, &mut out);
        }
        Ok(out)
    }

    fn resolve_destination(&self, dest: &Destination) -> anyhow::Result<Option<u32>> {
        Ok(match dest {
            Destination::Named(name) => self.page_for_name(name),
            Destination::Ref { id, generation } => {
                self.page_for_ref(destination_ref(*id, *generation))
            }
            Destination::PageIndex(index) => {
                let page = index.saturating_add(1);
                (page <= self.page_count).then_some(page)
            }
        })
    }

    fn render_page(
        &self,
        page: u32,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RgbaBitmap> {
        anyhow::ensure!(page >= 1, "pages are 1-based");
        self.renderer
            .render_rgba(&self.bytes, page - 1, target_width, max_height)
            .with_context(|| format!("render page {page}"))
    }
}
