//! Progress-callback trait for per-job generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as jobs start and settle. The `synthdoc` binary drives its progress
//! bar through this trait; tests use it to observe how many jobs are in
//! flight at once.
//!
//! # Example
//!
//! ```rust
//! use synthdoc::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, index: usize, total: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("job {index} done ({done}/{total})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::JobError;
use std::sync::Arc;

/// Called by the orchestrator as it runs each job.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_job_start`, `on_job_complete` and `on_job_dropped` are called
/// concurrently from different worker tasks. Protect shared mutable state
/// with `Mutex` or atomics.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once, after preflight, before any job starts.
    fn on_generation_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a job occupies a worker slot.
    fn on_job_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a job produced a sample.
    fn on_job_complete(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a job was dropped from the manifest.
    fn on_job_dropped(&self, index: usize, total: usize, error: &JobError) {
        let _ = (index, total, error);
    }

    /// Called once after every job has settled.
    ///
    /// # Arguments
    /// * `total`    : jobs requested
    /// * `succeeded`: samples in the manifest
    fn on_generation_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
