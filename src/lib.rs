//! # synthdoc
//!
//! Generate synthetic, labelled document images for training and evaluating
//! OCR models.
//!
//! Each sample is a random lab report rendered through a LaTeX template,
//! typeset by an external engine, checked to fit on exactly one page,
//! rasterised, and paired with one randomly degraded copy. The run produces a
//! directory of PNGs and a JSON manifest holding the ground-truth text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! for each job index i in 0..N, at most W at once:
//!  │
//!  ├─ 1. Record    random patient, dates, 5–10 analyte rows
//!  ├─ 2. Template  Jinja-style template → .tex source in a scratch dir
//!  ├─ 3. Typeset   xelatex (child process, timeout, killed on expiry)
//!  ├─ 4. Validate  exactly one page, else dropped; text + 3× raster (pdfium) ┐ worker
//!  ├─ 5. Augment   one of six degradations → images/{i:05}_aug.png          ┘ process
//!  └─ 6. Collect   successful samples → data.json
//! ```
//!
//! Multi-page artifacts and typesetter failures are expected at a small rate
//! and are dropped quietly; anything else is logged as a warning. Neither
//! stops the run. Only configuration problems found during preflight are
//! fatal.
//!
//! ## Quick Start
//!
//! Steps 4 and 5 run in a child process that re-executes the current binary
//! (see [`worker`]), so `main` hands over to the worker first:
//!
//! ```rust,no_run
//! use synthdoc::{generate_to_dir, worker, GenerationConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     if worker::is_worker_process() {
//!         return Ok(worker::serve_default()?);
//!     }
//!     let config = GenerationConfig::builder()
//!         .count(200)
//!         .dataset_dir("data")
//!         .build()?;
//!     let stats = tokio::runtime::Runtime::new()?.block_on(generate_to_dir(&config))?;
//!     eprintln!("{} of {} samples", stats.succeeded, stats.requested);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `synthdoc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Runtime requirements
//!
//! A TeX engine with `fontspec` and `polyglossia` (`xelatex` by default) on
//! `PATH`, and the pdfium shared library, either on the system library path
//! or in the directory passed to
//! [`GenerationConfigBuilder::pdfium_library_dir`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod generate;
mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{augment_directory, preview_all, AugmentDirReport, AugmentedFile, PreviewImage};
pub use config::{GenerationConfig, GenerationConfigBuilder, Isolation, DEFAULT_TEMPLATE};
pub use error::{
    ArtifactError, FailureKind, JobError, SynthError, TemplateError, TypesetError, WorkerError,
};
pub use generate::{generate, generate_sync, generate_to_dir};
pub use output::{GenerationOutput, GenerationStats, JobOutcome, Manifest, SampleRecord};
pub use pipeline::augment::{Augmentation, AugmentationKind};
pub use pipeline::record::{AnalyteRow, DocumentRecord, RandomLabReportProducer, RecordProducer, RenderMetadata};
pub use pipeline::template::Template;
pub use pipeline::typeset::{ExternalTypesetter, Typesetter};
pub use pipeline::validate::{ArtifactPage, ArtifactReader, PdfiumReader, RASTER_ZOOM};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{generate_stream, JobStream};
