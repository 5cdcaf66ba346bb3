//! Offline augmentation of existing images.
//!
//! [`preview_all`] shows what each of the six transforms does to one image;
//! [`augment_directory`] gives every PNG in a folder one random transform and
//! records which. Neither touches the typesetter or pdfium.

use crate::error::SynthError;
use crate::output::{to_pretty_json, write_atomic};
use crate::pipeline::augment::{self, AugmentationKind};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the metadata written by [`augment_directory`].
pub const AUGMENTATION_METADATA_NAME: &str = "augmentation_metadata.json";

/// One image written by [`preview_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    /// `None` for the unmodified original.
    pub kind: Option<AugmentationKind>,
    pub path: PathBuf,
}

/// One source image processed by [`augment_directory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedFile {
    pub source_file: String,
    pub original_file: String,
    pub augmented_file: String,
    pub augmentation_type: AugmentationKind,
    pub augmentation_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct AugmentDirReport {
    pub files: Vec<AugmentedFile>,
    /// Source images that could not be read or written, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Written only when at least one image succeeded.
    pub metadata_path: Option<PathBuf>,
}

impl AugmentDirReport {
    /// How often each kind was applied.
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.files {
            *counts.entry(f.augmentation_type.name()).or_insert(0) += 1;
        }
        counts
    }
}

fn open_rgb(path: &Path) -> Result<RgbImage, SynthError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| SynthError::ImageReadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

fn save_rgb(image: &RgbImage, path: &Path) -> Result<(), SynthError> {
    image.save(path).map_err(|e| SynthError::ImageWriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

async fn create_dir(dir: &Path) -> Result<(), SynthError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SynthError::OutputDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Apply every kind once to `image_path`.
///
/// Writes `<stem>_Original.png` and `<stem>_<Kind>.png` for each of the six
/// kinds into `out_dir`.
pub async fn preview_all(
    image_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PreviewImage>, SynthError> {
    let image_path = image_path.as_ref().to_path_buf();
    let out_dir = out_dir.as_ref().to_path_buf();
    create_dir(&out_dir).await?;

    tokio::task::spawn_blocking(move || {
        let original = open_rgb(&image_path)?;
        let stem = file_stem(&image_path);

        let mut written = Vec::with_capacity(AugmentationKind::ALL.len() + 1);
        let path = out_dir.join(format!("{stem}_Original.png"));
        save_rgb(&original, &path)?;
        written.push(PreviewImage { kind: None, path });

        for kind in AugmentationKind::ALL {
            let path = out_dir.join(format!("{stem}_{}.png", kind.name()));
            save_rgb(&augment::apply(&original, kind), &path)?;
            written.push(PreviewImage {
                kind: Some(kind),
                path,
            });
        }
        Ok(written)
    })
    .await
    .map_err(|e| SynthError::Internal(format!("preview task failed: {e}")))?
}

/// PNG files directly inside `dir`, sorted by name.
pub fn list_png_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Give every PNG in `source_dir` one random augmentation.
///
/// For each `<stem>.png` writes `<stem>_original.png` and `<stem>_<Kind>.png`
/// into `out_dir`, then writes [`AUGMENTATION_METADATA_NAME`] listing what was
/// applied. A file that cannot be processed is logged and skipped.
pub async fn augment_directory(
    source_dir: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<AugmentDirReport, SynthError> {
    let source_dir = source_dir.as_ref().to_path_buf();
    let out_dir = out_dir.as_ref().to_path_buf();
    create_dir(&out_dir).await?;

    let sources = list_png_files(&source_dir).map_err(|e| SynthError::ImageReadFailed {
        path: source_dir.clone(),
        detail: e.to_string(),
    })?;
    info!("Augmenting {} images from {}", sources.len(), source_dir.display());

    let blocking_out = out_dir.clone();
    let mut report = tokio::task::spawn_blocking(move || {
        let mut report = AugmentDirReport::default();
        let mut rng = rand::thread_rng();
        for source in sources {
            match augment_one(&source, &blocking_out, &mut rng) {
                Ok(file) => report.files.push(file),
                Err(e) => {
                    warn!("Skipping {}: {}", source.display(), e);
                    report.failed.push((source, e.to_string()));
                }
            }
        }
        report
    })
    .await
    .map_err(|e| SynthError::Internal(format!("augmentation task failed: {e}")))?;

    if !report.files.is_empty() {
        let path = out_dir.join(AUGMENTATION_METADATA_NAME);
        let write_err = |source| SynthError::ManifestWriteFailed {
            path: path.clone(),
            source,
        };
        let json = to_pretty_json(&report.files).map_err(|e| write_err(std::io::Error::other(e)))?;
        write_atomic(&path, json).await.map_err(write_err)?;
        report.metadata_path = Some(path);
    }
    Ok(report)
}

fn augment_one<R: rand::Rng + ?Sized>(
    source: &Path,
    out_dir: &Path,
    rng: &mut R,
) -> Result<AugmentedFile, SynthError> {
    let image = open_rgb(source)?;
    let stem = file_stem(source);
    let (kind, augmented) = augment::augment_random(&image, rng);

    let augmented_file = format!("{stem}_{}.png", kind.name());
    save_rgb(&augmented, &out_dir.join(&augmented_file))?;
    let original_file = format!("{stem}_original.png");
    save_rgb(&image, &out_dir.join(&original_file))?;

    Ok(AugmentedFile {
        source_file: source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        original_file,
        augmented_file,
        augmentation_type: kind,
        augmentation_description: kind.description().to_string(),
    })
}
