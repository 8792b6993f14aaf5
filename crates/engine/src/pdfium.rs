use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::{PdfBitmapFormat, PdfRenderConfig, Pdfium};

use crate::RgbaBitmap;

const LIB_PATH_VAR: &str = "POH_READER_PDFIUM_LIB_PATH";
const LIB_DIR_VAR: &str = "POH_READER_PDFIUM_DIR";
const DISABLE_VAR: &str = "POH_READER_DISABLE_PDFIUM";

/// Page rasterizer. pdfium is bound on the first render; a failed bind is
/// remembered so later renders fail fast with the same message.
#[derive(Default)]
pub struct Renderer {
    binding: OnceCell<Result<Pdfium, String>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.binding.get() {
            None => "unbound",
            Some(Ok(_)) => "bound",
            Some(Err(_)) => "unavailable",
        };
        f.debug_struct("Renderer").field("pdfium", &state).finish()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders one zero-based page to RGBA, fitted to `target_width` and no
    /// taller than `max_height`.
    pub fn render_rgba(
        &self,
        bytes: &[u8],
        page_index: u32,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RgbaBitmap> {
        anyhow::ensure!(!env_flag(DISABLE_VAR), "pdfium disabled via {DISABLE_VAR}");
        let pdfium = self.pdfium()?;

        let index = u16::try_from(page_index)
            .map_err(|_| anyhow::anyhow!("page index {page_index} out of range"))?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|err| anyhow::anyhow!("pdfium load: {err}"))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|err| anyhow::anyhow!("pdfium page {page_index}: {err}"))?;

        let width = target_width.max(1);
        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_maximum_width(width)
            .set_maximum_height(max_height.max(1))
            .render_form_data(false)
            .render_annotations(true)
            .set_format(PdfBitmapFormat::BGRA);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| anyhow::anyhow!("pdfium render: {err}"))?;

        let width = usize::try_from(bitmap.width()).unwrap_or(0);
        let height = usize::try_from(bitmap.height()).unwrap_or(0);
        Ok(RgbaBitmap {
            width,
            height,
            stride: width * 4,
            pixels: bgra_rows_to_rgba(&bitmap.as_raw_bytes(), width, height),
        })
    }

    fn pdfium(&self) -> anyhow::Result<&Pdfium> {
        let binding = self.binding.get_or_init(|| {
            bind_pdfium().map_err(|err| {
                tracing::warn!("pdfium unavailable: {err:#}");
                format!("{err:#}")
            })
        });
        binding.as_ref().map_err(|msg| anyhow::anyhow!("{msg}"))
    }
}

/// Packs `height` rows of BGRA into tight RGBA rows. Row padding in `src` is
/// dropped; missing bytes read as opaque white.
fn bgra_rows_to_rgba(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width * 4;
    let stride = if height == 0 { 0 } else { src.len() / height };
    let mut out = vec![255u8; row_bytes * height];
    if stride == 0 {
        return out;
    }

    for (dst_row, src_row) in out.chunks_exact_mut(row_bytes).zip(src.chunks(stride)) {
        let src_row = &src_row[..src_row.len().min(row_bytes)];
        for (dst, bgra) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
            dst.copy_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
        }
    }
    out
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| !matches!(value.trim(), "" | "0"))
}

/// Library locations tried in order before the system loader.
fn library_candidates() -> impl Iterator<Item = PathBuf> {
    let configured = std::env::var_os(LIB_DIR_VAR).map(PathBuf::from);
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    configured
        .into_iter()
        .chain(beside_exe)
        .chain(std::iter::once(PathBuf::from(".pdfium")))
        .map(|dir| Pdfium::pdfium_platform_library_name_at_path(&dir))
}

fn bind_pdfium() -> anyhow::Result<Pdfium> {
    if let Some(path) = std::env::var_os(LIB_PATH_VAR).map(PathBuf::from) {
        let bindings = Pdfium::bind_to_library(&path).map_err(|err| {
            anyhow::anyhow!("load pdfium from {LIB_PATH_VAR}={}: {err}", path.display())
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let bound = library_candidates().find_map(|path| {
        let bindings = Pdfium::bind_to_library(&path).ok()?;
        tracing::debug!("bound pdfium from {}", path.display());
        Some(bindings)
    });
    let bindings = match bound {
        Some(bindings) => bindings,
        None => Pdfium::bind_to_system_library().map_err(|err| {
            anyhow::anyhow!(
                "pdfium not found ({err}); install it or place {} next to the executable",
                Pdfium::pdfium_platform_library_name().to_string_lossy()
            )
        })?,
    };
    Ok(Pdfium::new(bindings))
}
