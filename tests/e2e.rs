//! End-to-end tests against a real TeX installation and pdfium.
//!
//! These run `xelatex` and bind the pdfium shared library, so they are gated
//! behind the `E2E_ENABLED` environment variable and do nothing in CI unless
//! explicitly requested.
//!
//! Pages are rasterised by the `synthdoc` binary acting as worker, so this
//! target needs the `cli` feature.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_DIR=/opt/pdfium/lib cargo test --test e2e -- --nocapture

use std::path::PathBuf;
use synthdoc::{
    generate_to_dir, preview_all, AugmentationKind, GenerationConfig, Isolation, Manifest,
    SynthError,
};
use tracing_subscriber::EnvFilter;

/// Skip this test unless `E2E_ENABLED` is set.
macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
    };
}

/// Library logs in test output; `RUST_LOG=synthdoc=debug` for per-job detail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synthdoc=info")),
        )
        .with_test_writer()
        .try_init();
}

fn pdfium_dir() -> Option<PathBuf> {
    std::env::var_os("PDFIUM_LIB_DIR").map(PathBuf::from)
}

fn base_config(dataset: &std::path::Path, count: usize) -> GenerationConfig {
    let mut builder = GenerationConfig::builder()
        .count(count)
        .workers(2)
        .dataset_dir(dataset)
        .typesetter_timeout_secs(300)
        // This test binary cannot serve as a worker; the CLI binary can.
        .isolation(Isolation::Worker {
            program: PathBuf::from(env!("CARGO_BIN_EXE_synthdoc")),
            args: Vec::new(),
        });
    if let Some(dir) = pdfium_dir() {
        builder = builder.pdfium_library_dir(dir);
    }
    builder.build().expect("valid config")
}

#[tokio::test]
async fn test_small_dataset_with_real_tools() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path(), 3);

    let stats = generate_to_dir(&config).await.expect("generation runs");
    println!("{stats:?}");
    assert_eq!(stats.requested, 3);
    assert_eq!(stats.tool_failures, 0, "xelatex failed: {stats:?}");
    assert_eq!(stats.unexpected_failures, 0);

    let manifest = Manifest::read(config.manifest_path()).await.unwrap();
    assert_eq!(manifest.len(), stats.succeeded);
    for record in manifest.iter() {
        assert!(!record.text.trim().is_empty());
        assert!(!record.text.contains('\n'), "text must be flattened");
        assert!(record.aug_name.parse::<AugmentationKind>().is_ok());

        let clean = image::open(&record.image_path).expect("clean image");
        let aug = image::open(&record.aug_image_path).expect("augmented image");
        assert_eq!(
            (clean.width(), clean.height()),
            (aug.width(), aug.height()),
            "augmentation must preserve size"
        );
        // A4 portrait at 3x zoom is well over 1000px tall.
        assert!(clean.height() > clean.width());
        assert!(clean.height() > 1000);
    }

    // Scratch directories are cleaned up when intermediates are not kept.
    let leftovers = std::fs::read_dir(config.scratch_root())
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_typesetter_is_reported_before_jobs() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = GenerationConfig::builder()
        .count(2)
        .dataset_dir(dir.path())
        .typesetter_program("definitely-not-a-tex-engine")
        .isolation(Isolation::InProcess)
        .build()
        .unwrap();

    let err = generate_to_dir(&config).await.unwrap_err();
    assert!(
        matches!(err, SynthError::TypesetterUnavailable { .. }),
        "got: {err}"
    );
    assert!(!config.manifest_path().exists());
}

#[tokio::test]
async fn test_preview_of_generated_page() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path(), 1);
    let stats = generate_to_dir(&config).await.unwrap();
    if stats.succeeded == 0 {
        println!("SKIP: the single sample overflowed onto a second page");
        return;
    }

    let manifest = Manifest::read(config.manifest_path()).await.unwrap();
    let first = manifest.iter().next().unwrap();
    let written = preview_all(&first.image_path, dir.path().join("preview"))
        .await
        .unwrap();
    assert_eq!(written.len(), AugmentationKind::ALL.len() + 1);
    for p in &written {
        assert!(p.path.exists(), "missing {}", p.path.display());
    }
}
