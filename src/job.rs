//! One generation job, and the read-only context every job shares.
//!
//! A job is: produce a record, render the template, typeset it in a private
//! scratch directory, validate and rasterise the artifact, augment the raster,
//! write both images. Every failure along the way becomes a [`JobError`]; none
//! of them reaches another job. The rasterise stage runs in a worker process
//! unless the config asks for [`Isolation::InProcess`].
//!
//! [`Isolation::InProcess`]: crate::config::Isolation::InProcess

use crate::config::{GenerationConfig, DEFAULT_TEMPLATE};
use crate::error::{FailureKind, JobError, SynthError};
use crate::output::SampleRecord;
use crate::pipeline::augment;
use crate::pipeline::record::RecordProducer;
use crate::pipeline::template::Template;
use crate::pipeline::typeset::Typesetter;
use crate::pipeline::validate::{ArtifactReader, RASTER_ZOOM};
use crate::progress::ProgressCallback;
use crate::worker::{self, WorkerCommand};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Where the rasterise stage runs.
pub(crate) enum RasterStage {
    InProcess(Arc<dyn ArtifactReader>),
    Worker(WorkerCommand),
}

/// Everything a job needs, built once by [`JobContext::prepare`].
pub(crate) struct JobContext {
    pub template: Template,
    pub producer: Arc<dyn RecordProducer>,
    pub typesetter: Arc<dyn Typesetter>,
    pub raster: RasterStage,
    pub images_dir: PathBuf,
    pub scratch_root: PathBuf,
    pub keep_intermediates: bool,
    pub total: usize,
    pub progress: Option<ProgressCallback>,
}

impl JobContext {
    /// Load and check everything that would otherwise fail in every job.
    ///
    /// 1. read and parse the template, validate it against a sample record
    /// 2. preflight the typesetter, then the artifact reader or worker
    /// 3. create the images and scratch directories
    pub async fn prepare(config: &GenerationConfig) -> Result<Self, SynthError> {
        if worker::is_worker_process() {
            return Err(SynthError::InvalidConfig(format!(
                "a worker process ({} is set) cannot start a generation run",
                worker::WORKER_ENV
            )));
        }

        let template = load_template(config).await?;

        let producer = config.resolve_record_producer();
        let sample = producer.produce();
        template.validate_against(&sample)?;

        let typesetter = config.resolve_typesetter();
        typesetter
            .preflight()
            .await
            .map_err(|e| SynthError::TypesetterUnavailable {
                program: typesetter.name().to_string(),
                detail: e.to_string(),
            })?;

        let raster = match config.resolve_worker()? {
            Some(command) => {
                if config.artifact_reader.is_some() {
                    warn!("artifact_reader is ignored: artifacts are read in worker processes");
                }
                command.preflight().await?;
                debug!("Rasterising in worker processes ({})", command.name());
                RasterStage::Worker(command)
            }
            None => {
                let reader = config.resolve_artifact_reader();
                let preflight_reader = Arc::clone(&reader);
                tokio::task::spawn_blocking(move || preflight_reader.preflight())
                    .await
                    .map_err(|e| SynthError::Internal(format!("renderer preflight task failed: {e}")))?
                    .map_err(|e| SynthError::RendererUnavailable {
                        detail: e.to_string(),
                    })?;
                RasterStage::InProcess(reader)
            }
        };

        let images_dir = config.images_dir();
        let scratch_root = config.scratch_root();
        for dir in [&images_dir, &scratch_root] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SynthError::OutputDirFailed {
                    path: dir.clone(),
                    source: e,
                })?;
        }

        Ok(Self {
            template,
            producer,
            typesetter,
            raster,
            images_dir,
            scratch_root,
            keep_intermediates: config.keep_intermediates,
            total: config.count,
            progress: config.progress_callback.clone(),
        })
    }

    pub fn started(&self, index: usize) {
        if let Some(ref cb) = self.progress {
            cb.on_job_start(index, self.total);
        }
    }

    /// Log the outcome and forward it to the progress callback.
    pub fn settled(&self, index: usize, result: &Result<SampleRecord, JobError>) {
        match result {
            Ok(sample) => {
                debug!("Job {} done: {}", index, sample.image_path.display());
                if let Some(ref cb) = self.progress {
                    cb.on_job_complete(index, self.total);
                }
            }
            Err(e) => {
                match e.kind() {
                    FailureKind::Validation | FailureKind::ExternalTool => {
                        debug!("Dropping job {}: {}", index, e)
                    }
                    FailureKind::Unexpected => warn!("Job {} failed unexpectedly: {}", index, e),
                }
                if let Some(ref cb) = self.progress {
                    cb.on_job_dropped(index, self.total, e);
                }
            }
        }
    }
}

async fn load_template(config: &GenerationConfig) -> Result<Template, SynthError> {
    let source = match (&config.template_source, &config.template_path) {
        (Some(source), _) => source.clone(),
        (None, Some(path)) => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SynthError::TemplateRead {
                    path: path.clone(),
                    source: e,
                })?
        }
        (None, None) => DEFAULT_TEMPLATE.to_string(),
    };
    Ok(Template::parse(&source)?)
}

/// `{index:05}.png` and `{index:05}_aug.png` under `images_dir`.
pub fn image_paths(images_dir: &Path, index: usize) -> (PathBuf, PathBuf) {
    (
        images_dir.join(format!("{index:05}.png")),
        images_dir.join(format!("{index:05}_aug.png")),
    )
}

/// Run job `index` to completion.
pub(crate) async fn run_job(ctx: Arc<JobContext>, index: usize) -> Result<SampleRecord, JobError> {
    let record = ctx.producer.produce();
    record
        .validate()
        .map_err(|v| JobError::unexpected(index, format!("invalid record: {v}")))?;
    let metadata = record.metadata();

    let source_text = ctx
        .template
        .render(&record)
        .map_err(|e| JobError::unexpected(index, format!("template: {e}")))?;
    drop(record);

    // Removed on drop unless kept below.
    let scratch = tempfile::Builder::new()
        .prefix(&format!("job-{index:05}-"))
        .tempdir_in(&ctx.scratch_root)
        .map_err(|e| JobError::unexpected(index, format!("scratch dir: {e}")))?;

    let source = scratch.path().join(format!("report_{index:05}.tex"));
    tokio::fs::write(&source, source_text)
        .await
        .map_err(|e| JobError::unexpected(index, format!("writing {}: {e}", source.display())))?;

    let artifact = ctx
        .typesetter
        .typeset(&source, scratch.path())
        .await
        .map_err(|e| JobError::from_typeset(index, e))?;

    let (image_path, aug_image_path) = image_paths(&ctx.images_dir, index);
    let rasterised = match &ctx.raster {
        RasterStage::Worker(command) => {
            command
                .rasterise(index, &artifact, &image_path, &aug_image_path)
                .await
        }
        RasterStage::InProcess(reader) => {
            let reader = Arc::clone(reader);
            let paths = (image_path.clone(), aug_image_path.clone());
            tokio::task::spawn_blocking(move || {
                rasterise_and_augment(reader.as_ref(), &artifact, index, &paths.0, &paths.1)
            })
            .await
            .unwrap_or_else(|e| Err(join_error(index, e)))
        }
    };
    let (text, kind) = match rasterised {
        Ok(done) => done,
        Err(e) => {
            // A crashed stage may have got as far as the clean image.
            discard(&[&image_path, &aug_image_path]).await;
            return Err(e);
        }
    };

    if ctx.keep_intermediates {
        let kept = scratch.keep();
        debug!("Job {} intermediates kept in {}", index, kept.display());
    }

    Ok(SampleRecord {
        metadata,
        text,
        image_path,
        aug_image_path,
        aug_name: kind.name().to_string(),
    })
}

async fn discard(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Blocking half of a job: pdfium, the augmentation and PNG encoding.
///
/// Both images are computed before either is written.
pub(crate) fn rasterise_and_augment(
    reader: &dyn ArtifactReader,
    artifact: &Path,
    index: usize,
    image_path: &Path,
    aug_image_path: &Path,
) -> Result<(String, augment::AugmentationKind), JobError> {
    let page = reader
        .read(artifact, RASTER_ZOOM)
        .map_err(|e| JobError::from_artifact(index, e))?;

    let clean = page.image.to_rgb8();
    let (kind, augmented) = augment::augment_random(&clean, &mut rand::thread_rng());

    clean
        .save(image_path)
        .map_err(|e| JobError::unexpected(index, format!("writing {}: {e}", image_path.display())))?;
    if let Err(e) = augmented.save(aug_image_path) {
        // Never leave a clean image without its twin.
        let _ = std::fs::remove_file(image_path);
        return Err(JobError::unexpected(
            index,
            format!("writing {}: {e}", aug_image_path.display()),
        ));
    }
    Ok((page.text, kind))
}

/// A job task that panicked or was cancelled is an unexpected failure.
pub(crate) fn join_error(index: usize, err: JoinError) -> JobError {
    if err.is_panic() {
        JobError::unexpected(index, format!("panicked: {}", panic_message(err.into_panic())))
    } else {
        JobError::unexpected(index, err)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_names_derive_from_index() {
        let (clean, aug) = image_paths(Path::new("data/images"), 7);
        assert_eq!(clean, PathBuf::from("data/images/00007.png"));
        assert_eq!(aug, PathBuf::from("data/images/00007_aug.png"));
    }

    struct Blank;

    impl ArtifactReader for Blank {
        fn read(
            &self,
            _artifact: &Path,
            zoom: f32,
        ) -> Result<crate::pipeline::validate::ArtifactPage, crate::error::ArtifactError> {
            let side = (10.0 * zoom) as u32;
            Ok(crate::pipeline::validate::ArtifactPage {
                text: "blank".into(),
                image: image::RgbImage::from_pixel(side, side, image::Rgb([255, 255, 255])).into(),
            })
        }
    }

    #[test]
    fn failed_augmented_write_leaves_no_clean_image() {
        let dir = tempfile::tempdir().unwrap();
        let (clean, aug) = image_paths(dir.path(), 4);
        // A directory where the augmented PNG should go makes its write fail.
        std::fs::create_dir(&aug).unwrap();

        let err = rasterise_and_augment(&Blank, &dir.path().join("report_00004.pdf"), 4, &clean, &aug)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unexpected);
        assert!(!clean.exists(), "clean image left without its twin");
    }

    #[tokio::test]
    async fn discard_removes_partial_output_and_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (clean, aug) = image_paths(dir.path(), 1);
        std::fs::write(&clean, b"partial").unwrap();
        discard(&[&clean, &aug]).await;
        assert!(!clean.exists());
    }

    #[tokio::test]
    async fn panics_become_unexpected_failures() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err = join_error(3, handle.await.unwrap_err());
        assert_eq!(err.kind(), FailureKind::Unexpected);
        assert_eq!(err.index(), 3);
        assert!(err.to_string().contains("boom"), "got: {err}");
    }
}
