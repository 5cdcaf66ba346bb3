//! Error types for the synthdoc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SynthError`]: **Fatal**: the run cannot proceed at all (bad template,
//!   missing typesetter, unwritable dataset directory). Returned as
//!   `Err(SynthError)` from the top-level `generate*` functions.
//!
//! * [`JobError`]: **Non-fatal**: a single job failed (multi-page artifact,
//!   typesetter crash, I/O glitch) but every other job is unaffected. Carried
//!   inside [`crate::output::JobOutcome`] and folded out of the manifest.
//!
//! The per-stage errors [`TemplateError`], [`TypesetError`], [`ArtifactError`]
//! and [`WorkerError`] are what the individual stages return; the
//! orchestrator maps all but the first onto [`JobError`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the synthdoc library.
///
/// Job-level failures use [`JobError`] and never surface here.
#[derive(Debug, Error)]
pub enum SynthError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The template file could not be read.
    #[error("Failed to read template '{path}': {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template does not match the record schema or is malformed.
    ///
    /// Every job renders the same template against the same schema, so this
    /// is raised once before any job runs rather than N times.
    #[error("Template configuration error: {0}")]
    Template(#[from] TemplateError),

    /// The external typesetting tool cannot be started.
    #[error(
        "Typesetter '{program}' is not available: {detail}\n\
Install it (e.g. a TeX Live distribution providing xelatex) or pass --typesetter."
    )]
    TypesetterUnavailable { program: String, detail: String },

    /// The page-rendering backend cannot be loaded.
    #[error(
        "Page renderer is not available: {detail}\n\
Install the pdfium shared library or pass --pdfium-lib-dir."
    )]
    RendererUnavailable { detail: String },

    /// The isolated worker process cannot be started or does not answer.
    #[error(
        "Worker process '{program}' is not usable: {detail}\n\
A binary that generates with process isolation must call \
synthdoc::worker::serve_default() at the top of main, or use Isolation::InProcess."
    )]
    WorkerUnavailable { program: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the dataset or scratch directory.
    #[error("Failed to create directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write the manifest file.
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read the manifest file.
    #[error("Failed to read manifest '{path}': {source}")]
    ManifestReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not a valid JSON array of samples.
    #[error("Manifest '{path}' is malformed: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An input image could not be opened or decoded.
    #[error("Failed to read image '{path}': {detail}")]
    ImageReadFailed { path: PathBuf, detail: String },

    /// An output image could not be encoded or written.
    #[error("Failed to write image '{path}': {detail}")]
    ImageWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A template that cannot be rendered against the record schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Block tags are unbalanced or malformed.
    #[error("line {line}: {detail}")]
    Syntax { line: usize, detail: String },

    /// A `{{ … }}` or block tag names a field the record does not have.
    #[error("line {line}: unresolved reference '{name}'")]
    UnresolvedReference { line: usize, name: String },

    /// A `{% for %}` target is not a list.
    #[error("line {line}: '{name}' is not iterable")]
    NotIterable { line: usize, name: String },

    /// A `{{ … }}` target is a list or object.
    #[error("line {line}: '{name}' is not a scalar value")]
    NotScalar { line: usize, name: String },

    /// A `| filter` is not one of the known filters.
    #[error("line {line}: unknown filter '{name}'")]
    UnknownFilter { line: usize, name: String },
}

/// Failure of the external typesetting step for one job.
#[derive(Debug, Error)]
pub enum TypesetError {
    /// The process could not be started at all.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and reported failure.
    #[error("'{program}' exited with status {status}")]
    Exited { program: String, status: String },

    /// The process did not finish within the configured timeout and was killed.
    #[error("'{program}' timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    /// The process reported success but wrote no artifact.
    #[error("typesetter reported success but '{path}' does not exist")]
    MissingOutput { path: PathBuf },
}

/// Failure while opening or rasterising a typeset artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact has more than one page.
    #[error("artifact has {pages} pages, expected exactly 1")]
    MultiPage { pages: usize },

    /// The artifact has no pages.
    #[error("artifact has no pages")]
    Empty,

    /// The backend could not be bound or the artifact could not be opened.
    #[error("failed to open '{path}': {detail}")]
    Open { path: PathBuf, detail: String },

    /// Text extraction or rasterisation of the single page failed.
    #[error("failed to read page: {detail}")]
    Page { detail: String },
}

/// Failure talking to an isolated worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The worker died or exited non-zero; `stderr` holds its last lines.
    #[error("worker terminated abnormally ({status}){stderr}")]
    Crashed { status: String, stderr: String },

    #[error("worker reply is not valid: {0}")]
    Protocol(String),
}

/// The category of a job failure.
///
/// Validation and external-tool failures are expected at a nonzero rate in a
/// bulk run and are dropped quietly; unexpected failures are logged loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Validation,
    ExternalTool,
    Unexpected,
}

/// A non-fatal error for a single job.
///
/// Stored in [`crate::output::JobOutcome`]. The run continues regardless.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum JobError {
    /// The template/record combination overflowed one page.
    #[error("Job {index}: artifact has {pages} pages")]
    Validation { index: usize, pages: usize },

    /// The external typesetting process failed.
    #[error("Job {index}: typesetting failed: {detail}")]
    ExternalTool { index: usize, detail: String },

    /// Anything else: I/O, corrupt artifact, image encoding, task panic.
    #[error("Job {index}: {detail}")]
    Unexpected { index: usize, detail: String },
}

impl JobError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::Validation { .. } => FailureKind::Validation,
            JobError::ExternalTool { .. } => FailureKind::ExternalTool,
            JobError::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            JobError::Validation { index, .. }
            | JobError::ExternalTool { index, .. }
            | JobError::Unexpected { index, .. } => *index,
        }
    }

    pub(crate) fn unexpected(index: usize, detail: impl std::fmt::Display) -> Self {
        JobError::Unexpected {
            index,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn from_typeset(index: usize, err: TypesetError) -> Self {
        match err {
            TypesetError::Exited { .. } | TypesetError::TimedOut { .. } => JobError::ExternalTool {
                index,
                detail: err.to_string(),
            },
            TypesetError::Spawn { .. } | TypesetError::MissingOutput { .. } => {
                JobError::unexpected(index, err)
            }
        }
    }

    pub(crate) fn from_worker(index: usize, err: WorkerError) -> Self {
        JobError::unexpected(index, err)
    }

    pub(crate) fn from_artifact(index: usize, err: ArtifactError) -> Self {
        match err {
            ArtifactError::MultiPage { pages } => JobError::Validation { index, pages },
            other => JobError::unexpected(index, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_and_timeout_are_external_tool_failures() {
        let e = JobError::from_typeset(
            3,
            TypesetError::Exited {
                program: "xelatex".into(),
                status: "exit status: 1".into(),
            },
        );
        assert_eq!(e.kind(), FailureKind::ExternalTool);
        assert_eq!(e.index(), 3);

        let e = JobError::from_typeset(
            4,
            TypesetError::TimedOut {
                program: "xelatex".into(),
                secs: 120,
            },
        );
        assert_eq!(e.kind(), FailureKind::ExternalTool);
        assert!(e.to_string().contains("120s"), "got: {e}");
    }

    #[test]
    fn missing_output_is_unexpected() {
        let e = JobError::from_typeset(
            1,
            TypesetError::MissingOutput {
                path: PathBuf::from("/tmp/x.pdf"),
            },
        );
        assert_eq!(e.kind(), FailureKind::Unexpected);
    }

    #[test]
    fn multi_page_is_validation_failure() {
        let e = JobError::from_artifact(7, ArtifactError::MultiPage { pages: 2 });
        assert_eq!(e.kind(), FailureKind::Validation);
        assert!(e.to_string().contains("2 pages"), "got: {e}");

        let e = JobError::from_artifact(7, ArtifactError::Empty);
        assert_eq!(e.kind(), FailureKind::Unexpected);
    }

    #[test]
    fn worker_crash_is_unexpected_and_names_the_status() {
        let e = JobError::from_worker(
            2,
            WorkerError::Crashed {
                status: "signal: 6 (SIGABRT)".into(),
                stderr: ": fatal error in page renderer".into(),
            },
        );
        assert_eq!(e.kind(), FailureKind::Unexpected);
        assert_eq!(e.index(), 2);
        let msg = e.to_string();
        assert!(msg.contains("SIGABRT"), "got: {msg}");
        assert!(msg.contains("page renderer"), "got: {msg}");
    }

    #[test]
    fn template_error_display() {
        let e = SynthError::from(TemplateError::UnresolvedReference {
            line: 12,
            name: "patient_surname".into(),
        });
        let msg = e.to_string();
        assert!(msg.contains("line 12"), "got: {msg}");
        assert!(msg.contains("patient_surname"), "got: {msg}");
    }
}
