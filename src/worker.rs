//! Process isolation for the rasterise stage.
//!
//! Reading an artifact goes through pdfium, a native library. A corrupt PDF
//! can crash it outright, and a crash cannot be caught as a panic. With
//! [`crate::config::Isolation::CurrentExe`] (the default) or
//! [`crate::config::Isolation::Worker`], each job reads, rasterises and
//! augments its artifact in a fresh child process. A child that dies costs
//! that job and nothing else.
//!
//! One request per process. The parent writes a JSON [`WorkerRequest`] to the
//! child's stdin and closes it; the child answers with one JSON
//! [`WorkerReply`] on stdout and exits.
//!
//! A binary that generates with the default isolation hands control to the
//! worker at the top of `main`:
//!
//! ```rust,no_run
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     if synthdoc::worker::is_worker_process() {
//!         return Ok(synthdoc::worker::serve_default()?);
//!     }
//!     // ... build a GenerationConfig and call synthdoc::generate
//!     Ok(())
//! }
//! ```

use crate::error::{JobError, SynthError, WorkerError};
use crate::job::rasterise_and_augment;
use crate::pipeline::augment::AugmentationKind;
use crate::pipeline::validate::{ArtifactReader, PdfiumReader};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// Set in the environment of every worker child.
pub const WORKER_ENV: &str = "SYNTHDOC_WORKER";

/// pdfium library directory handed to the worker child.
pub const PDFIUM_DIR_ENV: &str = "SYNTHDOC_PDFIUM_LIB_DIR";

const STDERR_TAIL_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Check that the reader can be loaded.
    Preflight,
    /// Read `artifact`, write both images, report the text and the kind.
    Rasterise {
        index: usize,
        artifact: PathBuf,
        image_path: PathBuf,
        aug_image_path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Ready,
    Unavailable { detail: String },
    Done { text: String, kind: AugmentationKind },
    Failed { error: JobError },
}

/// True in a process started as a worker child.
pub fn is_worker_process() -> bool {
    std::env::var_os(WORKER_ENV).is_some()
}

/// Answer one request from stdin with `reader`, reply on stdout.
pub fn serve(reader: &dyn ArtifactReader) -> Result<(), SynthError> {
    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .map_err(|e| SynthError::Internal(format!("worker failed to read its request: {e}")))?;
    let request: WorkerRequest = serde_json::from_slice(&input)
        .map_err(|e| SynthError::Internal(format!("malformed worker request: {e}")))?;

    let reply = handle(reader, request);

    let json = serde_json::to_vec(&reply)
        .map_err(|e| SynthError::Internal(format!("worker reply: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&json)
        .and_then(|_| stdout.flush())
        .map_err(|e| SynthError::Internal(format!("worker failed to write its reply: {e}")))
}

/// [`serve`] with pdfium, located through [`PDFIUM_DIR_ENV`].
pub fn serve_default() -> Result<(), SynthError> {
    let reader = PdfiumReader::new(std::env::var_os(PDFIUM_DIR_ENV).map(PathBuf::from));
    serve(&reader)
}

pub(crate) fn handle(reader: &dyn ArtifactReader, request: WorkerRequest) -> WorkerReply {
    match request {
        WorkerRequest::Preflight => match reader.preflight() {
            Ok(()) => WorkerReply::Ready,
            Err(e) => WorkerReply::Unavailable {
                detail: e.to_string(),
            },
        },
        WorkerRequest::Rasterise {
            index,
            artifact,
            image_path,
            aug_image_path,
        } => match rasterise_and_augment(reader, &artifact, index, &image_path, &aug_image_path) {
            Ok((text, kind)) => WorkerReply::Done { text, kind },
            Err(error) => WorkerReply::Failed { error },
        },
    }
}

/// How the orchestrator starts a worker child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Passed to the child as [`PDFIUM_DIR_ENV`].
    pub pdfium_library_dir: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn name(&self) -> String {
        self.program.display().to_string()
    }

    /// Spawn a child, send `request`, wait for its reply.
    ///
    /// The child is killed if this future is dropped.
    pub async fn call(&self, request: &WorkerRequest) -> Result<WorkerReply, WorkerError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| WorkerError::Protocol(e.to_string()))?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.pdfium_library_dir {
            cmd.env(PDFIUM_DIR_ENV, dir);
        }

        let mut child = cmd.spawn().map_err(|e| WorkerError::Spawn {
            program: self.name(),
            source: e,
        })?;

        // A child that dies before reading its request breaks the pipe; its
        // exit status explains more than the write error does.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload).await,
            None => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(WorkerError::Crashed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        sent?;
        serde_json::from_slice(&output.stdout).map_err(|e| {
            WorkerError::Protocol(format!("{e}{}", stderr_tail(&output.stderr)))
        })
    }

    /// Confirm the child starts and its reader loads.
    pub(crate) async fn preflight(&self) -> Result<(), SynthError> {
        match self.call(&WorkerRequest::Preflight).await {
            Ok(WorkerReply::Ready) => Ok(()),
            Ok(WorkerReply::Unavailable { detail }) => Err(SynthError::RendererUnavailable { detail }),
            Ok(other) => Err(SynthError::WorkerUnavailable {
                program: self.name(),
                detail: format!("unexpected reply to preflight: {other:?}"),
            }),
            Err(e) => Err(SynthError::WorkerUnavailable {
                program: self.name(),
                detail: e.to_string(),
            }),
        }
    }

    /// Run the rasterise stage of job `index` in a child.
    pub(crate) async fn rasterise(
        &self,
        index: usize,
        artifact: &Path,
        image_path: &Path,
        aug_image_path: &Path,
    ) -> Result<(String, AugmentationKind), JobError> {
        let request = WorkerRequest::Rasterise {
            index,
            artifact: artifact.to_path_buf(),
            image_path: image_path.to_path_buf(),
            aug_image_path: aug_image_path.to_path_buf(),
        };
        match self.call(&request).await {
            Ok(WorkerReply::Done { text, kind }) => Ok((text, kind)),
            Ok(WorkerReply::Failed { error }) => Err(error),
            Ok(other) => Err(JobError::from_worker(
                index,
                WorkerError::Protocol(format!("unexpected reply: {other:?}")),
            )),
            Err(e) => Err(JobError::from_worker(index, e)),
        }
    }
}

/// `": line | line | line"` from the last non-empty stderr lines, or `""`.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!(": {}", lines[start..].join(" | "))
}
