//! Streaming generation API: emit job outcomes as they settle.
//!
//! Unlike the eager [`crate::generate::generate`] which returns only after
//! every job settles, [`generate_stream`] yields [`JobOutcome`]s through a
//! `Stream` in completion order. Failed jobs are yielded too, so the caller
//! decides what to do with them; `generate` simply folds them out.

use crate::config::GenerationConfig;
use crate::error::SynthError;
use crate::job::{join_error, run_job, JobContext};
use crate::output::JobOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of job outcomes.
pub type JobStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

/// Preflight, then run `config.count` jobs with at most `config.workers` in
/// flight, yielding each outcome as soon as its job settles.
///
/// Each job runs in its own tokio task, so a panic in one job is captured as
/// that job's unexpected failure; the rasterise stage additionally runs in a
/// child process unless isolation is turned off, so a native crash there is
/// captured the same way. Output file names derive from the job index,
/// never from completion order.
///
/// # Returns
/// - `Ok(JobStream)`: one item per job, `config.count` in total
/// - `Err(SynthError)`: preflight failed (template, typesetter, renderer,
///   output directories); no job was started
pub async fn generate_stream(config: &GenerationConfig) -> Result<JobStream, SynthError> {
    let ctx = Arc::new(JobContext::prepare(config).await?);
    // Fields are public; zero would stall `buffer_unordered`.
    let workers = config.workers.max(1);
    info!(
        "Generating {} samples with {} workers using '{}'",
        config.count,
        workers,
        ctx.typesetter.name()
    );
    if let Some(ref cb) = ctx.progress {
        cb.on_generation_start(config.count);
    }

    let s = stream::iter(0..config.count)
        .map(move |index| {
            let ctx = Arc::clone(&ctx);
            async move {
                ctx.started(index);
                let result = match tokio::spawn(run_job(Arc::clone(&ctx), index)).await {
                    Ok(result) => result,
                    Err(e) => Err(join_error(index, e)),
                };
                ctx.settled(index, &result);
                JobOutcome { index, result }
            }
        })
        .buffer_unordered(workers);

    Ok(Box::pin(s))
}
