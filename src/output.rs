//! Output types: per-sample records, the manifest, and run statistics.
//!
//! The manifest is the only artifact a downstream OCR trainer reads. It is a
//! JSON array of [`SampleRecord`]s written with 4-space indentation and
//! non-ASCII characters left as-is, so Cyrillic analyte names stay readable
//! in the file.

use crate::error::{JobError, SynthError};
use crate::pipeline::record::RenderMetadata;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One successful job: a clean image, its augmented twin, and the ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// `font`, `font_size`, `row_separator` serialised inline.
    #[serde(flatten)]
    pub metadata: RenderMetadata,
    /// Page text with line breaks flattened to spaces.
    pub text: String,
    pub image_path: PathBuf,
    pub aug_image_path: PathBuf,
    /// Name of the augmentation kind applied to `aug_image_path`.
    pub aug_name: String,
}

/// What a single job hands back to the orchestrator.
#[derive(Debug)]
pub struct JobOutcome {
    /// Job index in `[0, count)`; the output file names derive from it.
    pub index: usize,
    pub result: Result<SampleRecord, JobError>,
}

/// Successful samples in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    records: Vec<SampleRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: SampleRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleRecord> {
        self.records.iter()
    }

    pub fn into_vec(self) -> Vec<SampleRecord> {
        self.records
    }

    /// Serialise to the on-disk format: pretty JSON, 4-space indent, UTF-8.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        to_pretty_json(&self.records)
    }

    /// Write the manifest to `path`. Consumes the manifest, so a run writes it
    /// exactly once.
    ///
    /// Uses atomic write (temp file + rename) so a crash never leaves a
    /// truncated manifest behind.
    pub async fn write(self, path: impl AsRef<Path>) -> Result<(), SynthError> {
        let path = path.as_ref();
        let write_err = |source| SynthError::ManifestWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let json = self
            .to_json()
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        write_atomic(path, json).await.map_err(write_err)
    }

    /// Read a manifest previously written by [`Manifest::write`].
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, SynthError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SynthError::ManifestReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| SynthError::ManifestParse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl IntoIterator for Manifest {
    type Item = SampleRecord;
    type IntoIter = std::vec::IntoIter<SampleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Pretty JSON with 4-space indentation and non-ASCII left unescaped.
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, contents: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Counters for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub requested: usize,
    pub succeeded: usize,
    /// Multi-page artifacts.
    pub validation_failures: usize,
    /// Typesetter exited non-zero or timed out.
    pub tool_failures: usize,
    pub unexpected_failures: usize,
    pub total_duration_ms: u64,
}

impl GenerationStats {
    pub fn dropped(&self) -> usize {
        self.validation_failures + self.tool_failures + self.unexpected_failures
    }

    pub(crate) fn record(&mut self, outcome: &JobOutcome) {
        use crate::error::FailureKind;
        match &outcome.result {
            Ok(_) => self.succeeded += 1,
            Err(e) => match e.kind() {
                FailureKind::Validation => self.validation_failures += 1,
                FailureKind::ExternalTool => self.tool_failures += 1,
                FailureKind::Unexpected => self.unexpected_failures += 1,
            },
        }
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.total_duration_ms = elapsed.as_millis() as u64;
    }
}

/// Result of [`crate::generate`]: the manifest plus counters.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub manifest: Manifest,
    pub stats: GenerationStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> SampleRecord {
        SampleRecord {
            metadata: RenderMetadata {
                font: "DejaVu Serif".into(),
                font_size: 11,
                row_separator: i % 2 == 0,
            },
            text: format!("Иванов Иван Общий белок 72 г/л #{i}"),
            image_path: PathBuf::from(format!("data/images/{i:05}.png")),
            aug_image_path: PathBuf::from(format!("data/images/{i:05}_aug.png")),
            aug_name: "GaussianBlur".into(),
        }
    }

    #[test]
    fn json_is_flat_indented_and_unescaped() {
        let mut m = Manifest::new();
        m.push(sample(0));
        let json = m.to_json().unwrap();
        assert!(json.starts_with("[\n    {\n        \""));
        assert!(json.contains("\"font\": \"DejaVu Serif\""));
        assert!(json.contains("\"font_size\": 11"));
        assert!(json.contains("\"row_separator\": true"));
        assert!(json.contains("Иванов"), "non-ASCII must not be escaped: {json}");
        assert!(!json.contains("metadata"));
    }

    #[tokio::test]
    async fn write_then_read_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        let mut m = Manifest::new();
        for i in [3, 0, 7] {
            m.push(sample(i));
        }
        let expected = m.clone();
        m.write(&path).await.unwrap();

        assert!(!dir.path().join("nested").join("data.json.tmp").exists());
        let back = Manifest::read(&path).await.unwrap();
        assert_eq!(back, expected);
        assert_eq!(back.iter().next().unwrap().image_path, PathBuf::from("data/images/00003.png"));
    }

    #[tokio::test]
    async fn read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            Manifest::read(&path).await,
            Err(SynthError::ManifestParse { .. })
        ));
        assert!(matches!(
            Manifest::read(dir.path().join("missing.json")).await,
            Err(SynthError::ManifestReadFailed { .. })
        ));
    }

    #[test]
    fn stats_count_by_failure_kind() {
        let mut stats = GenerationStats {
            requested: 4,
            ..Default::default()
        };
        let outcomes = [
            JobOutcome { index: 0, result: Ok(sample(0)) },
            JobOutcome { index: 1, result: Err(JobError::Validation { index: 1, pages: 2 }) },
            JobOutcome {
                index: 2,
                result: Err(JobError::ExternalTool { index: 2, detail: "exit 1".into() }),
            },
            JobOutcome {
                index: 3,
                result: Err(JobError::Unexpected { index: 3, detail: "io".into() }),
            },
        ];
        for o in &outcomes {
            stats.record(o);
        }
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.tool_failures, 1);
        assert_eq!(stats.unexpected_failures, 1);
        assert_eq!(stats.dropped(), 3);
    }
}
