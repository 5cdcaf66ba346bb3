//! Typesetting: compile a rendered source into a PDF with an external tool.
//!
//! ## Why a trait?
//!
//! The orchestrator only needs "source path in, artifact path out". Putting
//! that behind [`Typesetter`] lets tests and library users inject a stub (or
//! a different engine such as `lualatex`/`tectonic`) without touching the
//! job logic, the same way a pre-built provider can be injected into the
//! config.
//!
//! ## Why a timeout?
//!
//! A TeX engine waiting on a missing font or stuck in an error prompt never
//! exits. Without a bound that one job would pin its worker slot for the rest
//! of the run. The child is spawned with `kill_on_drop`, so dropping the
//! timed-out future kills the process.

use crate::error::TypesetError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Compiles a source file into a paginated artifact.
#[async_trait]
pub trait Typesetter: Send + Sync {
    /// Compile `source` and write the artifact into `out_dir`.
    ///
    /// Returns the artifact path.
    async fn typeset(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, TypesetError>;

    /// Check the tool can be run at all. Called once before any job.
    async fn preflight(&self) -> Result<(), TypesetError> {
        Ok(())
    }

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Runs an external TeX-style engine: `program [args] --output-directory=<dir> <source>`.
#[derive(Debug, Clone)]
pub struct ExternalTypesetter {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ExternalTypesetter {
    fn default() -> Self {
        Self {
            program: "xelatex".to_string(),
            args: vec!["-interaction=nonstopmode".to_string()],
            timeout_secs: 120,
        }
    }
}

impl ExternalTypesetter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Where a TeX engine writes its PDF: `<out_dir>/<source stem>.pdf`.
pub fn artifact_path(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source.file_stem().unwrap_or(source.as_os_str());
    out_dir.join(stem).with_extension("pdf")
}

#[async_trait]
impl Typesetter for ExternalTypesetter {
    async fn typeset(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, TypesetError> {
        let mut cmd = self.command();
        cmd.args(&self.args)
            .arg(format!("--output-directory={}", out_dir.display()))
            .arg(source);

        let mut child = cmd.spawn().map_err(|e| TypesetError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let status = match timeout(Duration::from_secs(self.timeout_secs), child.wait()).await {
            Ok(status) => status.map_err(|e| TypesetError::Spawn {
                program: self.program.clone(),
                source: e,
            })?,
            Err(_) => {
                // Best effort; kill_on_drop covers the case where this fails.
                let _ = child.kill().await;
                return Err(TypesetError::TimedOut {
                    program: self.program.clone(),
                    secs: self.timeout_secs,
                });
            }
        };

        if !status.success() {
            return Err(TypesetError::Exited {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }

        let artifact = artifact_path(source, out_dir);
        if !tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            return Err(TypesetError::MissingOutput { path: artifact });
        }
        debug!("Typeset {} → {}", source.display(), artifact.display());
        Ok(artifact)
    }

    /// Spawn `program --version` to confirm the binary exists.
    async fn preflight(&self) -> Result<(), TypesetError> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let mut child = cmd.spawn().map_err(|e| TypesetError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;
        // Only spawnability matters; the exit status of --version is ignored.
        let _ = timeout(Duration::from_secs(self.timeout_secs), child.wait()).await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_swaps_extension() {
        let p = artifact_path(Path::new("/w/job-00003/report_00003.tex"), Path::new("/w/job-00003"));
        assert_eq!(p, PathBuf::from("/w/job-00003/report_00003.pdf"));
    }

    #[test]
    fn default_is_non_interactive_xelatex() {
        let t = ExternalTypesetter::default();
        assert_eq!(t.program, "xelatex");
        assert!(t.args.iter().any(|a| a == "-interaction=nonstopmode"));
        assert_eq!(t.timeout_secs, 120);
    }

    #[test]
    fn missing_program_fails_preflight() {
        let t = ExternalTypesetter::new("definitely-not-a-typesetter-binary");
        let err = tokio_test::block_on(t.preflight()).unwrap_err();
        assert!(matches!(err, TypesetError::Spawn { .. }), "got: {err}");
    }
}
