//! Page source: turn a document into ordered, encoded page images.
//!
//! Rendering is a boundary concern: the pipeline only needs a [`PageSource`]
//! that hands back [`Page`]s in document order. Two implementations ship:
//!
//! * [`PdfiumPageSource`] rasterises a PDF via pdfium. pdfium keeps
//!   thread-local state and is CPU-bound, so every call runs inside
//!   `spawn_blocking`.
//! * [`MemoryPageSource`] serves pre-rendered images (tests, callers with their
//!   own renderer).
//!
//! The pixel cap bounds memory regardless of physical page size: an A0 poster
//! at 150 DPI would otherwise be a 7 000 × 9 900 px bitmap.

use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use crate::output::Page;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Produces the page images of one document.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Render the given 0-based page indices, in the order given.
    ///
    /// Returned pages carry 1-based `index` values.
    async fn render(&self, indices: &[usize]) -> Result<Vec<Page>, PipelineError>;
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Pages that are already encoded images.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageSource {
    images: Vec<Vec<u8>>,
}

impl MemoryPageSource {
    /// `images[i]` becomes page `i + 1`. Images are assumed to be PNG.
    pub fn new(images: Vec<Vec<u8>>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl PageSource for MemoryPageSource {
    fn page_count(&self) -> usize {
        self.images.len()
    }

    async fn render(&self, indices: &[usize]) -> Result<Vec<Page>, PipelineError> {
        indices
            .iter()
            .map(|&idx| {
                self.images
                    .get(idx)
                    .map(|img| Page::png(idx + 1, img.clone()))
                    .ok_or(PipelineError::RenderFailed {
                        page: idx + 1,
                        detail: format!("document has {} pages", self.images.len()),
                    })
            })
            .collect()
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// A PDF on disk, rendered through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumPageSource {
    path: PathBuf,
    page_count: usize,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumPageSource {
    /// Validate the file and read its page count.
    pub async fn open(path: impl AsRef<Path>, config: &ExtractionConfig) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        check_pdf_file(&path)?;

        let probe_path = path.clone();
        let page_count = tokio::task::spawn_blocking(move || count_pages_blocking(&probe_path))
            .await
            .map_err(|e| PipelineError::Internal(format!("page-count task panicked: {e}")))??;
        info!("Opened {}: {} pages", path.display(), page_count);

        Ok(Self {
            path,
            page_count,
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PageSource for PdfiumPageSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn render(&self, indices: &[usize]) -> Result<Vec<Page>, PipelineError> {
        let path = self.path.clone();
        let indices = indices.to_vec();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);

        tokio::task::spawn_blocking(move || render_blocking(&path, dpi, max_pixels, &indices))
            .await
            .map_err(|e| PipelineError::Internal(format!("render task panicked: {e}")))?
    }
}

/// Existence, permission, and `%PDF` magic check before pdfium sees the file.
pub fn check_pdf_file(path: &Path) -> Result<(), PipelineError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(PipelineError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    debug!("Validated PDF header: {}", path.display());
    Ok(())
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system.
fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => Pdfium::bind_to_library(p),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| {
        PipelineError::Internal(format!(
            "failed to bind pdfium ({e:?}); set PDFIUM_LIB_PATH to an existing libpdfium"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn load_error(path: &Path, e: PdfiumError) -> PipelineError {
    PipelineError::CorruptPdf {
        path: path.to_path_buf(),
        detail: format!("{e:?}"),
    }
}

fn count_pages_blocking(path: &Path) -> Result<usize, PipelineError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| load_error(path, e))?;
    Ok(document.pages().len() as usize)
}

fn render_blocking(
    path: &Path,
    dpi: u32,
    max_pixels: u32,
    indices: &[usize],
) -> Result<Vec<Page>, PipelineError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| load_error(path, e))?;
    let pages = document.pages();

    let mut out = Vec::with_capacity(indices.len());
    for &idx in indices {
        let failed = |detail: String| PipelineError::RenderFailed {
            page: idx + 1,
            detail,
        };

        let page = pages.get(idx as u16).map_err(|e| failed(format!("{e:?}")))?;

        // Points are 1/72 inch.
        let width_px = (page.width().value * dpi as f32 / 72.0).round() as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px.clamp(1, max_pixels as i32))
            .set_maximum_height(max_pixels as i32);

        let image = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{e:?}")))?
            .as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let png = encode_png(&image).map_err(|e| failed(format!("PNG encoding: {e}")))?;
        out.push(Page::png(idx + 1, png));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_renders_selected_pages() {
        let source = MemoryPageSource::new(vec![vec![1], vec![2], vec![3]]);
        assert_eq!(source.page_count(), 3);
        let pages = source.render(&[0, 2]).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 1);
        assert_eq!(pages[1].index, 3);
        assert_eq!(pages[1].image, vec![3]);
    }

    #[tokio::test]
    async fn memory_source_out_of_range() {
        let source = MemoryPageSource::new(vec![vec![1]]);
        let err = source.render(&[1]).await.unwrap_err();
        assert!(matches!(err, PipelineError::RenderFailed { page: 2, .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = check_pdf_file(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"PK\x03\x04zip").unwrap();
        let err = check_pdf_file(tmp.path()).unwrap_err();
        match err {
            PipelineError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"%PDF-1.7\n").unwrap();
        assert!(check_pdf_file(tmp.path()).is_ok());
    }
}
