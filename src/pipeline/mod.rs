//! Pipeline stages for one generation job.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! record ──▶ template ──▶ typeset ──▶ validate ──▶ augment
//! (producer)  (source)    (xelatex)   (pdfium)     (image)
//! ```
//!
//! 1. [`record`]  : one random [`record::DocumentRecord`] per job
//! 2. [`template`]: render the record into document source text
//! 3. [`typeset`] : run the external engine; the only stage that spawns a
//!    process
//! 4. [`validate`]: reject multi-page artifacts, extract text, rasterise;
//!    blocking, so the orchestrator runs it in `spawn_blocking`
//! 5. [`augment`] : apply one random degradation to the raster

pub mod augment;
pub mod record;
pub mod template;
pub mod typeset;
pub mod validate;
