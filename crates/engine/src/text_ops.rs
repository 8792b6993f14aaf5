//! Content-stream walking that turns text operators into positioned fragments.

use std::collections::HashMap;

use pdf::content::{Op, TextDrawAdjusted};
use pdf::font::ToUnicodeMap;
use pdf::object::{Resolve, Resources};
use pdf::primitive::{Name, PdfString};
use poh_core::TextFragment;

const TJ_INSERT_SPACE_THRESHOLD: f32 = -200.0;
const DEFAULT_FONT_SIZE: f32 = 12.0;
/// Rough glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Text state tracked across operators. Only translation and horizontal scale
/// of the text matrix are kept; that is enough to order runs on a page.
struct TextCursor {
    line_x: f32,
    line_y: f32,
    x: f32,
    scale_x: f32,
    scale_y: f32,
    font_size: f32,
    leading: f32,
}

impl Default for TextCursor {
    fn default() -> Self {
        Self {
            line_x: 0.0,
            line_y: 0.0,
            x: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            font_size: DEFAULT_FONT_SIZE,
            leading: 0.0,
        }
    }
}

impl TextCursor {
    fn begin(&mut self) {
        self.line_x = 0.0;
        self.line_y = 0.0;
        self.x = 0.0;
        self.scale_x = 1.0;
        self.scale_y = 1.0;
    }

    fn newline(&mut self) {
        let leading = if self.leading > 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.line_y -= leading * self.scale_y;
        self.x = self.line_x;
    }

    fn advance(&mut self, text: &str) {
        let glyphs = text.chars().count() as f32;
        self.x += glyphs * self.font_size * AVG_GLYPH_WIDTH * self.scale_x;
    }
}

pub(crate) fn ops_to_fragments(
    ops: &[Op],
    resolver: &impl Resolve,
    resources: &Resources,
) -> Vec<TextFragment> {
    let mut tounicode_cache: HashMap<Name, Option<ToUnicodeMap>> = HashMap::new();
    let mut current_font: Option<Name> = None;
    let mut cursor = TextCursor::default();
    let mut out = Vec::new();

    for op in ops {
        match op {
            Op::BeginText => cursor.begin(),
            Op::TextFont { name, size } => {
                current_font = Some(name.clone());
                cursor.font_size = if *size > 0.0 { *size } else { DEFAULT_FONT_SIZE };
            }
            Op::Leading { leading } => cursor.leading = *leading,
            Op::SetTextMatrix { matrix } => {
                cursor.line_x = matrix.e;
                cursor.line_y = matrix.f;
                cursor.x = matrix.e;
                cursor.scale_x = if matrix.a != 0.0 { matrix.a.abs() } else { 1.0 };
                cursor.scale_y = if matrix.d != 0.0 { matrix.d.abs() } else { 1.0 };
            }
            Op::MoveTextPosition { translation } => {
                cursor.line_x += translation.x * cursor.scale_x;
                cursor.line_y += translation.y * cursor.scale_y;
                cursor.x = cursor.line_x;
            }
            Op::TextNewline => cursor.newline(),
            Op::TextDraw { text } => {
                let s = decode_pdf_string(
                    text,
                    current_font.as_ref(),
                    resolver,
                    resources,
                    &mut tounicode_cache,
                );
                push_fragment(&mut out, &mut cursor, &s);
            }
            Op::TextDrawAdjusted { array } => {
                let mut run = String::new();
                let mut pending_space = false;
                for item in array {
                    match item {
                        TextDrawAdjusted::Text(text) => {
                            let s = decode_pdf_string(
                                text,
                                current_font.as_ref(),
                                resolver,
                                resources,
                                &mut tounicode_cache,
                            );
                            append_text_piece(&mut run, &s, &mut pending_space);
                        }
                        TextDrawAdjusted::Spacing(spacing) => {
                            if *spacing <= TJ_INSERT_SPACE_THRESHOLD {
                                pending_space = true;
                            }
                        }
                    }
                }
                push_fragment(&mut out, &mut cursor, &run);
            }
            _ => {}
        }
    }

    out
}

fn push_fragment(out: &mut Vec<TextFragment>, cursor: &mut TextCursor, raw: &str) {
    let text = collapse_whitespace(&sanitize_extracted_text(raw));
    if text.is_empty() {
        cursor.advance(raw);
        return;
    }
    out.push(TextFragment::new(text.clone(), cursor.x, cursor.line_y));
    cursor.advance(&text);
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn append_text_piece(out: &mut String, s: &str, pending_space: &mut bool) {
    let sanitized = sanitize_extracted_text(s);
    if sanitized.is_empty() {
        return;
    }

    if *pending_space {
        let suppress_before = sanitized
            .chars()
            .next()
            .is_some_and(|ch| matches!(ch, ',' | '.' | ';' | ':' | '!' | '?' | ')' | ']' | '}'));
        if !out.is_empty() && !suppress_before && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        *pending_space = false;
    }
    out.push_str(&sanitized);
}

fn decode_pdf_string(
    text: &PdfString,
    font_name: Option<&Name>,
    resolver: &impl Resolve,
    resources: &Resources,
    tounicode_cache: &mut HashMap<Name, Option<ToUnicodeMap>>,
) -> String {
    let Some(font_name) = font_name else {
        return text.to_string_lossy();
    };

    let Some(map) = tounicode_for_font(font_name, resolver, resources, tounicode_cache) else {
        return text.to_string_lossy();
    };

    decode_with_tounicode(text.as_bytes(), map).unwrap_or_else(|| text.to_string_lossy())
}

fn tounicode_for_font<'a>(
    font_name: &Name,
    resolver: &impl Resolve,
    resources: &Resources,
    cache: &'a mut HashMap<Name, Option<ToUnicodeMap>>,
) -> Option<&'a ToUnicodeMap> {
    cache
        .entry(font_name.clone())
        .or_insert_with(|| {
            resources
                .fonts
                .get(font_name)
                .and_then(|lazy| lazy.load(resolver).ok())
                .and_then(|font| font.to_unicode(resolver))
                .and_then(|res| res.ok())
        })
        .as_ref()
}

/// Decodes with the font's ToUnicode map, trying 1- and 2-byte codes and
/// keeping whichever maps more codes. Returns `None` when the map barely fits.
fn decode_with_tounicode(bytes: &[u8], map: &ToUnicodeMap) -> Option<String> {
    let mut best = decode_codes(bytes, 1, map);
    if bytes.len().is_multiple_of(2) {
        let wide = decode_codes(bytes, 2, map);
        if wide.matched > best.matched
            || (wide.matched == best.matched && wide.text.len() > best.text.len())
        {
            best = wide;
        }
    }

    if best.total == 0 {
        return None;
    }
    let ratio = best.matched as f32 / best.total as f32;
    if (best.matched < 2 && ratio < 0.3) || ratio < 0.05 {
        return None;
    }
    Some(best.text)
}

struct Decoded {
    text: String,
    matched: usize,
    total: usize,
}

fn decode_codes(bytes: &[u8], width: usize, map: &ToUnicodeMap) -> Decoded {
    let mut decoded = Decoded {
        text: String::new(),
        matched: 0,
        total: 0,
    };

    let codes: Box<dyn Iterator<Item = u16>> = match width {
        1 => Box::new(bytes.iter().map(|&b| b as u16)),
        2 => Box::new(
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
        ),
        _ => return decoded,
    };

    for code in codes {
        decoded.total += 1;
        match map.get(code) {
            Some(s) => {
                decoded.text.push_str(s);
                decoded.matched += 1;
            }
            None => decoded.text.push('\u{FFFD}'),
        }
    }
    decoded
}

pub(crate) fn sanitize_extracted_text(s: &str) -> String {
    s.chars()
        .filter_map(|ch| match ch {
            '\n' | '\t' => Some(ch),
            '\r' => Some('\n'),
            '\u{FFFD}' => None,
            _ if ch.is_control() => None,
            _ if is_private_use(ch as u32) || is_noncharacter(ch as u32) => None,
            _ => Some(ch),
        })
        .collect()
}

fn is_private_use(code: u32) -> bool {
    (0xE000..=0xF8FF).contains(&code)
        || (0xF0000..=0xFFFFD).contains(&code)
        || (0x100000..=0x10FFFD).contains(&code)
}

fn is_noncharacter(code: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&code) || (code & 0xFFFF == 0xFFFE) || (code & 0xFFFF == 0xFFFF)
}
