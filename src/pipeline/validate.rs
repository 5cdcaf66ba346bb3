//! Artifact validation: enforce the single-page constraint, then extract the
//! page text and rasterise it.
//!
//! ## Why post-hoc validation?
//!
//! Whether a report fits on one page depends on the font, the font size and
//! the number of analyte rows, and only the typesetter knows the answer. So we
//! typeset first and count pages afterwards. A multi-page artifact is a
//! [`ArtifactError::MultiPage`], expected for a small fraction of jobs, never
//! silently truncated to its first page.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; its calls are blocking
//! and CPU-bound. [`ArtifactReader::read`] is synchronous and the orchestrator
//! runs it on tokio's blocking pool.

use crate::error::ArtifactError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pixels per PDF point in every rasterised page.
///
/// Global on purpose: every image in a dataset must share one resolution.
pub const RASTER_ZOOM: f32 = 3.0;

/// The single page of a validated artifact.
#[derive(Debug, Clone)]
pub struct ArtifactPage {
    /// Page text with line breaks flattened to single spaces.
    pub text: String,
    pub image: DynamicImage,
}

/// Opens a typeset artifact and returns its only page.
///
/// Implementations must return [`ArtifactError::MultiPage`] when the artifact
/// has more than one page; [`check_page_count`] does exactly that.
pub trait ArtifactReader: Send + Sync {
    fn read(&self, artifact: &Path, zoom: f32) -> Result<ArtifactPage, ArtifactError>;

    /// Check the backend is usable. Called once, on the blocking pool, before
    /// any job.
    fn preflight(&self) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Exactly one page passes; zero is [`ArtifactError::Empty`].
pub fn check_page_count(pages: usize) -> Result<(), ArtifactError> {
    match pages {
        1 => Ok(()),
        0 => Err(ArtifactError::Empty),
        pages => Err(ArtifactError::MultiPage { pages }),
    }
}

/// Collapse every line break into one space so the text is a single
/// annotation string.
pub fn flatten_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// pdfium-backed reader.
///
/// Binds pdfium per call, inside the blocking task, so no pdfium handle is
/// ever shared between threads.
#[derive(Debug, Clone, Default)]
pub struct PdfiumReader {
    /// Directory holding the platform pdfium library. `None` uses the system
    /// library search path.
    pub library_dir: Option<PathBuf>,
}

impl PdfiumReader {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self, artifact: &Path) -> Result<Pdfium, ArtifactError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ArtifactError::Open {
            path: artifact.to_path_buf(),
            detail: format!("cannot bind pdfium: {e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl ArtifactReader for PdfiumReader {
    fn preflight(&self) -> Result<(), ArtifactError> {
        self.bind(Path::new("<pdfium>")).map(|_| ())
    }

    fn read(&self, artifact: &Path, zoom: f32) -> Result<ArtifactPage, ArtifactError> {
        let pdfium = self.bind(artifact)?;

        let document = pdfium
            .load_pdf_from_file(artifact, None)
            .map_err(|e| ArtifactError::Open {
                path: artifact.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        check_page_count(pages.len() as usize)?;

        let page = pages.get(0).map_err(|e| ArtifactError::Page {
            detail: format!("{:?}", e),
        })?;

        let text = page
            .text()
            .map_err(|e| ArtifactError::Page {
                detail: format!("text extraction: {:?}", e),
            })?
            .all();

        let render_config = PdfRenderConfig::new().scale_page_by_factor(zoom);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ArtifactError::Page {
                detail: format!("rasterisation: {:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rasterised {} → {}x{} px",
            artifact.display(),
            image.width(),
            image.height()
        );

        Ok(ArtifactPage {
            text: flatten_text(&text),
            image,
        })
    }
}
