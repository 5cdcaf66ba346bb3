//! Configuration types for dataset generation.
//!
//! All generation behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. The pipeline stages (record producer,
//! typesetter, artifact reader) are injectable trait objects; when unset the
//! orchestrator falls back to the bundled implementations.

use crate::error::SynthError;
use crate::pipeline::record::{RandomLabReportProducer, RecordProducer};
use crate::pipeline::typeset::{ExternalTypesetter, Typesetter};
use crate::pipeline::validate::{ArtifactReader, PdfiumReader};
use crate::progress::ProgressCallback;
use crate::worker::WorkerCommand;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// The lab-report template shipped with the crate.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/lab_report.tex");

/// Manifest file name inside the dataset directory.
pub const DEFAULT_MANIFEST_NAME: &str = "data.json";

/// Number of hardware threads, or 1 when it cannot be determined.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Where each job reads, rasterises and augments its artifact.
///
/// That stage calls into pdfium, a native library. In a worker process a
/// segfault or abort there fails one job; in process it ends the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Isolation {
    /// On the blocking pool of this process. Panics are still contained.
    InProcess,
    /// One child per job, re-running the current executable. Its `main` must
    /// call [`crate::worker::serve_default`] (or [`crate::worker::serve`])
    /// first.
    #[default]
    CurrentExe,
    /// One child per job, running `program args…`.
    Worker { program: PathBuf, args: Vec<String> },
}

/// Configuration for a generation run.
///
/// # Example
/// ```rust
/// use synthdoc::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .count(500)
///     .workers(4)
///     .dataset_dir("datasets/lab")
///     .build()
///     .unwrap();
/// assert_eq!(config.manifest_path().file_name().unwrap(), "data.json");
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Number of jobs to run. Default: 100.
    pub count: usize,

    /// Maximum jobs in flight. Default: available parallelism.
    ///
    /// Each job holds a typesetter process and a full-page raster, so more
    /// workers than hardware threads only adds memory pressure; `build()`
    /// clamps to the hardware thread count.
    pub workers: usize,

    /// Dataset root: `images/` and the manifest live here. Default: `data`.
    pub dataset_dir: PathBuf,

    /// Parent of the per-job scratch directories. Default: `<dataset>/.work`.
    pub work_dir: Option<PathBuf>,

    /// Template file. Mutually exclusive with `template_source`.
    pub template_path: Option<PathBuf>,

    /// Inline template text. When neither this nor `template_path` is set the
    /// bundled lab-report template is used.
    pub template_source: Option<String>,

    /// External typesetter binary. Default: `xelatex`.
    pub typesetter_program: String,

    /// Arguments passed before `--output-directory`. Default: `-interaction=nonstopmode`.
    pub typesetter_args: Vec<String>,

    /// Per-invocation timeout. Default: 120.
    pub typesetter_timeout_secs: u64,

    /// Pre-constructed typesetter. Takes precedence over `typesetter_program`.
    pub typesetter: Option<Arc<dyn Typesetter>>,

    /// Pre-constructed artifact reader. Default: pdfium. Only used with
    /// [`Isolation::InProcess`]; a worker process brings its own.
    pub artifact_reader: Option<Arc<dyn ArtifactReader>>,

    /// Pre-constructed record producer. Default: [`RandomLabReportProducer`].
    pub record_producer: Option<Arc<dyn RecordProducer>>,

    /// Directory holding the pdfium shared library. `None` uses the system
    /// library search path.
    pub pdfium_library_dir: Option<PathBuf>,

    /// Keep each job's scratch directory (source and PDF) after it finishes.
    pub keep_intermediates: bool,

    /// Process isolation for the rasterise stage. Default: [`Isolation::CurrentExe`].
    pub isolation: Isolation,

    /// Manifest file name. Default: `data.json`.
    pub manifest_file_name: String,

    /// Optional per-job progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let typesetter = ExternalTypesetter::default();
        Self {
            count: 100,
            workers: available_workers(),
            dataset_dir: PathBuf::from("data"),
            work_dir: None,
            template_path: None,
            template_source: None,
            typesetter_program: typesetter.program,
            typesetter_args: typesetter.args,
            typesetter_timeout_secs: typesetter.timeout_secs,
            typesetter: None,
            artifact_reader: None,
            record_producer: None,
            pdfium_library_dir: None,
            keep_intermediates: false,
            isolation: Isolation::default(),
            manifest_file_name: DEFAULT_MANIFEST_NAME.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("count", &self.count)
            .field("workers", &self.workers)
            .field("dataset_dir", &self.dataset_dir)
            .field("work_dir", &self.work_dir)
            .field("template_path", &self.template_path)
            .field(
                "template_source",
                &self.template_source.as_ref().map(|s| format!("<{} bytes>", s.len())),
            )
            .field("typesetter_program", &self.typesetter_program)
            .field("typesetter_args", &self.typesetter_args)
            .field("typesetter_timeout_secs", &self.typesetter_timeout_secs)
            .field("typesetter", &self.typesetter.as_ref().map(|t| t.name().to_string()))
            .field("artifact_reader", &self.artifact_reader.as_ref().map(|_| "<dyn ArtifactReader>"))
            .field("record_producer", &self.record_producer.as_ref().map(|_| "<dyn RecordProducer>"))
            .field("pdfium_library_dir", &self.pdfium_library_dir)
            .field("keep_intermediates", &self.keep_intermediates)
            .field("isolation", &self.isolation)
            .field("manifest_file_name", &self.manifest_file_name)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dataset_dir.join("images")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dataset_dir.join(&self.manifest_file_name)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.dataset_dir.join(".work"))
    }

    /// The injected typesetter, else an [`ExternalTypesetter`] built from the
    /// `typesetter_*` fields.
    pub fn resolve_typesetter(&self) -> Arc<dyn Typesetter> {
        match &self.typesetter {
            Some(t) => Arc::clone(t),
            None => Arc::new(ExternalTypesetter {
                program: self.typesetter_program.clone(),
                args: self.typesetter_args.clone(),
                timeout_secs: self.typesetter_timeout_secs,
            }),
        }
    }

    pub fn resolve_artifact_reader(&self) -> Arc<dyn ArtifactReader> {
        match &self.artifact_reader {
            Some(r) => Arc::clone(r),
            None => Arc::new(PdfiumReader::new(self.pdfium_library_dir.clone())),
        }
    }

    /// The worker to spawn per job, or `None` to rasterise in process.
    pub fn resolve_worker(&self) -> Result<Option<WorkerCommand>, SynthError> {
        let (program, args) = match &self.isolation {
            Isolation::InProcess => return Ok(None),
            Isolation::CurrentExe => {
                let exe = std::env::current_exe().map_err(|e| SynthError::WorkerUnavailable {
                    program: "<current executable>".into(),
                    detail: e.to_string(),
                })?;
                (exe, Vec::new())
            }
            Isolation::Worker { program, args } => (program.clone(), args.clone()),
        };
        Ok(Some(WorkerCommand {
            program,
            args,
            pdfium_library_dir: self.pdfium_library_dir.clone(),
        }))
    }

    pub fn resolve_record_producer(&self) -> Arc<dyn RecordProducer> {
        match &self.record_producer {
            Some(p) => Arc::clone(p),
            None => Arc::new(RandomLabReportProducer::default()),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn count(mut self, n: usize) -> Self {
        self.config.count = n;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dataset_dir = dir.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = Some(path.into());
        self
    }

    pub fn template_source(mut self, source: impl Into<String>) -> Self {
        self.config.template_source = Some(source.into());
        self
    }

    pub fn typesetter_program(mut self, program: impl Into<String>) -> Self {
        self.config.typesetter_program = program.into();
        self
    }

    pub fn typesetter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.typesetter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn typesetter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.typesetter_timeout_secs = secs.max(1);
        self
    }

    pub fn typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.config.typesetter = Some(typesetter);
        self
    }

    pub fn artifact_reader(mut self, reader: Arc<dyn ArtifactReader>) -> Self {
        self.config.artifact_reader = Some(reader);
        self
    }

    pub fn record_producer(mut self, producer: Arc<dyn RecordProducer>) -> Self {
        self.config.record_producer = Some(producer);
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn keep_intermediates(mut self, v: bool) -> Self {
        self.config.keep_intermediates = v;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.config.isolation = isolation;
        self
    }

    pub fn manifest_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.manifest_file_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// `workers` above the hardware thread count is clamped down with a warning.
    pub fn build(mut self) -> Result<GenerationConfig, SynthError> {
        let c = &mut self.config;
        if c.count == 0 {
            return Err(SynthError::InvalidConfig("count must be ≥ 1".into()));
        }
        if c.template_path.is_some() && c.template_source.is_some() {
            return Err(SynthError::InvalidConfig(
                "template_path and template_source are mutually exclusive".into(),
            ));
        }
        if c.typesetter.is_none() && c.typesetter_program.trim().is_empty() {
            return Err(SynthError::InvalidConfig(
                "typesetter program must not be empty".into(),
            ));
        }
        let name = c.manifest_file_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(SynthError::InvalidConfig(format!(
                "manifest file name must be a bare file name, got '{name}'"
            )));
        }

        let limit = available_workers();
        if c.workers > limit {
            warn!(
                "Requested {} workers but only {} hardware threads are available; using {}",
                c.workers, limit, limit
            );
            c.workers = limit;
        }
        c.workers = c.workers.max(1);
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = GenerationConfig::builder().build().unwrap();
        assert_eq!(c.count, 100);
        assert!(c.workers >= 1 && c.workers <= available_workers());
        assert_eq!(c.typesetter_program, "xelatex");
        assert_eq!(c.typesetter_timeout_secs, 120);
        assert_eq!(c.images_dir(), PathBuf::from("data/images"));
        assert_eq!(c.manifest_path(), PathBuf::from("data/data.json"));
        assert_eq!(c.scratch_root(), PathBuf::from("data/.work"));
    }

    #[test]
    fn workers_are_clamped_to_hardware() {
        let c = GenerationConfig::builder().workers(100_000).build().unwrap();
        assert_eq!(c.workers, available_workers());

        let c = GenerationConfig::builder().workers(0).build().unwrap();
        assert_eq!(c.workers, 1);
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(
            GenerationConfig::builder().count(0).build(),
            Err(SynthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn template_sources_are_exclusive() {
        let err = GenerationConfig::builder()
            .template_path("a.tex")
            .template_source("{{ patient_name }}")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"), "got: {err}");
    }

    #[test]
    fn manifest_name_must_be_bare() {
        assert!(GenerationConfig::builder()
            .manifest_file_name("sub/data.json")
            .build()
            .is_err());
    }

    #[test]
    fn explicit_work_dir_wins() {
        let c = GenerationConfig::builder()
            .dataset_dir("/d")
            .work_dir("/scratch")
            .build()
            .unwrap();
        assert_eq!(c.scratch_root(), PathBuf::from("/scratch"));
    }

    #[test]
    fn debug_elides_trait_objects() {
        let c = GenerationConfig::builder()
            .template_source("abc")
            .record_producer(Arc::new(RandomLabReportProducer::default()))
            .build()
            .unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("<3 bytes>"));
        assert!(s.contains("<dyn RecordProducer>"));
    }

    #[test]
    fn isolation_resolves_to_a_worker_command() {
        let c = GenerationConfig::builder()
            .pdfium_library_dir("/opt/pdfium")
            .build()
            .unwrap();
        assert_eq!(c.isolation, Isolation::CurrentExe);
        let cmd = c.resolve_worker().unwrap().expect("worker by default");
        assert_eq!(cmd.program, std::env::current_exe().unwrap());
        assert_eq!(cmd.pdfium_library_dir, Some(PathBuf::from("/opt/pdfium")));

        let c = GenerationConfig::builder()
            .isolation(Isolation::Worker {
                program: "/usr/bin/synthdoc".into(),
                args: vec!["--quiet".into()],
            })
            .build()
            .unwrap();
        let cmd = c.resolve_worker().unwrap().unwrap();
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/synthdoc"));
        assert_eq!(cmd.args, vec!["--quiet".to_string()]);

        let c = GenerationConfig::builder()
            .isolation(Isolation::InProcess)
            .build()
            .unwrap();
        assert!(c.resolve_worker().unwrap().is_none());
    }

    #[test]
    fn bundled_template_parses() {
        crate::pipeline::template::Template::parse(DEFAULT_TEMPLATE).unwrap();
    }
}
