//! Eager (whole-run) generation entry points.
//!
//! [`generate`] drives [`crate::stream::generate_stream`] to completion and
//! folds the outcomes into a [`Manifest`] plus [`GenerationStats`]. Failed
//! jobs are dropped from the manifest and counted by failure kind.

use crate::config::GenerationConfig;
use crate::error::SynthError;
use crate::output::{GenerationOutput, GenerationStats, Manifest};
use crate::stream::generate_stream;
use futures::StreamExt;
use std::time::Instant;
use tracing::info;

/// Generate a dataset.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(GenerationOutput)` once every job has settled, even if some jobs
/// failed (check `output.stats`). The manifest holds the successful samples
/// in completion order.
///
/// # Errors
/// Returns `Err(SynthError)` only for fatal errors, all detected before any
/// job runs:
/// - template unreadable, malformed, or referencing a missing field
/// - typesetter or page renderer not available
/// - dataset directories cannot be created
pub async fn generate(config: &GenerationConfig) -> Result<GenerationOutput, SynthError> {
    let start = Instant::now();
    let mut outcomes = generate_stream(config).await?;

    let mut manifest = Manifest::new();
    let mut stats = GenerationStats {
        requested: config.count,
        ..Default::default()
    };

    while let Some(outcome) = outcomes.next().await {
        stats.record(&outcome);
        if let Ok(sample) = outcome.result {
            manifest.push(sample);
        }
    }
    stats.finish(start.elapsed());

    info!(
        "Generation complete: {}/{} samples ({} multi-page, {} typesetter, {} unexpected), {}ms",
        stats.succeeded,
        stats.requested,
        stats.validation_failures,
        stats.tool_failures,
        stats.unexpected_failures,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(stats.requested, stats.succeeded);
    }

    Ok(GenerationOutput { manifest, stats })
}

/// Generate a dataset and write its manifest to `config.manifest_path()`.
pub async fn generate_to_dir(config: &GenerationConfig) -> Result<GenerationStats, SynthError> {
    let output = generate(config).await?;
    let path = config.manifest_path();
    output.manifest.write(&path).await?;
    info!("Manifest written to {}", path.display());
    Ok(output.stats)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(config: &GenerationConfig) -> Result<GenerationOutput, SynthError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SynthError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(config))
}
