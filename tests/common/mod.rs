//! Fakes shared by the integration tests. No TeX engine or pdfium needed.
//!
//! The fake typesetter copies the rendered source to `<stem>.pdf`; the fake
//! reader counts `ROW` lines in it and reports one page per 15 rows, so a
//! 40-row record overflows exactly like a real report would.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synthdoc::error::{ArtifactError, TypesetError};
use synthdoc::pipeline::record::ReferenceInterval;
use synthdoc::pipeline::typeset::artifact_path;
use synthdoc::pipeline::validate::{check_page_count, flatten_text};
use synthdoc::{
    AnalyteRow, ArtifactPage, ArtifactReader, DocumentRecord, GenerationConfig,
    GenerationProgressCallback, Isolation, JobError, RecordProducer, Typesetter,
};

pub const TEST_TEMPLATE: &str =
    "{{ patient_name }}\n{% for row in analyses %}ROW {{ row.name }} {{ row.value }}\n{% endfor %}";

pub const ROWS_PER_PAGE: usize = 15;

pub fn record_with_rows(n: usize) -> DocumentRecord {
    DocumentRecord {
        patient_name: "ПЕТРОВА АННА СЕРГЕЕВНА".into(),
        gender: "Жен".into(),
        age: 34,
        date_taken: "01.03.2025 08:15".into(),
        date_received: "01.03.2025 11:40".into(),
        doctor_date: "02.03.2025 06:10".into(),
        print_date: "02.03.2025".into(),
        clinic_name: "ООО «ДиаЛаб»".into(),
        clinic_city: "Казань".into(),
        analyses: (0..n)
            .map(|i| {
                AnalyteRow::numeric(
                    format!("Показатель {i}"),
                    4.2 + i as f64,
                    "ммоль/л",
                    ReferenceInterval { low: 3.0, high: 6.0 },
                    "",
                )
            })
            .collect(),
        general_comment: String::new(),
        executor_name: "Соколова Мария".into(),
        executor_position: "врач КЛД".into(),
        site: "example.org".into(),
        main_font: "DejaVu Sans".into(),
        row_separator: true,
        font_size: 11,
    }
}

pub struct FixedRows(pub usize);

impl RecordProducer for FixedRows {
    fn produce(&self) -> DocumentRecord {
        record_with_rows(self.0)
    }
}

/// Job index from `report_00007.tex` / `report_00007.pdf`.
pub fn job_index(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("report_"))
        .and_then(|s| s.parse().ok())
        .expect("job file name carries the index")
}

#[derive(Default)]
pub struct FakeTypesetter {
    pub delay_ms: u64,
    pub fail_for: HashSet<usize>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl Typesetter for FakeTypesetter {
    async fn typeset(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, TypesetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        let result = if self.fail_for.contains(&job_index(source)) {
            Err(TypesetError::Exited {
                program: "fake".into(),
                status: "exit status: 1".into(),
            })
        } else {
            let artifact = artifact_path(source, out_dir);
            tokio::fs::copy(source, &artifact).await.unwrap();
            Ok(artifact)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeReader {
    pub force_multi_page: HashSet<usize>,
    pub panic_for: HashSet<usize>,
    /// Kill the whole process, the way a native crash in pdfium would.
    pub abort_for: HashSet<usize>,
}

impl ArtifactReader for FakeReader {
    fn read(&self, artifact: &Path, zoom: f32) -> Result<ArtifactPage, ArtifactError> {
        let index = job_index(artifact);
        if self.abort_for.contains(&index) {
            std::process::abort();
        }
        if self.panic_for.contains(&index) {
            panic!("reader exploded on job {index}");
        }
        let text = std::fs::read_to_string(artifact).map_err(|e| ArtifactError::Open {
            path: artifact.to_path_buf(),
            detail: e.to_string(),
        })?;
        let rows = text.lines().filter(|l| l.starts_with("ROW")).count();
        let mut pages = rows.div_ceil(ROWS_PER_PAGE).max(1);
        if self.force_multi_page.contains(&index) {
            pages = 2;
        }
        check_page_count(pages)?;

        let (w, h) = ((20.0 * zoom) as u32, (28.0 * zoom) as u32);
        let image = RgbImage::from_fn(w, h, |x, y| {
            if y % 9 == 0 && x > 3 && x < w - 3 {
                Rgb([20, 20, 20])
            } else {
                Rgb([250, 250, 245])
            }
        });
        Ok(ArtifactPage {
            text: flatten_text(&text),
            image: image.into(),
        })
    }
}

/// Counts callback events and tracks how many jobs are between start and
/// settle at once.
#[derive(Default)]
pub struct CountingProgress {
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
    pub dropped: AtomicUsize,
    pub finished_with: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl CountingProgress {
    fn settle(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GenerationProgressCallback for CountingProgress {
    fn on_job_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }
    fn on_job_complete(&self, _index: usize, _total: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.settle();
    }
    fn on_job_dropped(&self, _index: usize, _total: usize, _error: &JobError) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
        self.settle();
    }
    fn on_generation_complete(&self, _total: usize, succeeded: usize) {
        self.finished_with.store(succeeded, Ordering::SeqCst);
    }
}

/// Fakes wired in, rasterising in process.
pub fn config(
    dir: &Path,
    count: usize,
    workers: usize,
    typesetter: Arc<FakeTypesetter>,
    reader: FakeReader,
    rows: usize,
) -> GenerationConfig {
    GenerationConfig::builder()
        .count(count)
        .workers(workers)
        .dataset_dir(dir)
        .template_source(TEST_TEMPLATE)
        .typesetter(typesetter)
        .artifact_reader(Arc::new(reader))
        .record_producer(Arc::new(FixedRows(rows)))
        .isolation(Isolation::InProcess)
        .build()
        .unwrap()
}

pub fn png_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
                .count()
        })
        .unwrap_or(0)
}
