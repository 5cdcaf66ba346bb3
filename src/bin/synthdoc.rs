//! CLI binary for synthdoc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use synthdoc::{
    augment_directory, generate_to_dir, preview_all, worker, FailureKind, GenerationConfig,
    GenerationProgressCallback, Isolation, JobError, ProgressCallback,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Keep one-line error messages within a terminal row.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let mut out: String = s.chars().take(max_chars - 1).collect();
        out.push('\u{2026}');
        out
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per dropped job. Jobs settle out of
/// order, so per-job timings are keyed by index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    dropped: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_generation_start` sets the length (after preflight).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking template, typesetter and pdfium…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            dropped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} jobs  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating {total} samples…"))
        ));
    }

    fn on_job_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_job_complete(&self, index: usize, _total: usize) {
        let _ = self.elapsed_secs(index);
        self.bar.inc(1);
    }

    fn on_job_dropped(&self, index: usize, _total: usize, error: &JobError) {
        let secs = self.elapsed_secs(index);
        self.dropped.fetch_add(1, Ordering::SeqCst);

        let (mark, msg) = match error.kind() {
            FailureKind::Validation | FailureKind::ExternalTool => {
                (dim("–"), dim(&truncate(&error.to_string(), 80)))
            }
            FailureKind::Unexpected => (red("✗"), red(&truncate(&error.to_string(), 80))),
        };
        self.bar.println(format!(
            "  {} Job {:>5}  {}  {}",
            mark,
            index,
            msg,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, total: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let dropped = total.saturating_sub(succeeded);
        if dropped == 0 {
            eprintln!("{} {} samples generated", green("✔"), bold(&succeeded.to_string()));
        } else {
            eprintln!(
                "{} {}/{} samples generated  ({} dropped)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                dropped,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 100 samples into ./data (data/images/*.png + data/data.json)
  synthdoc

  # 5000 samples, 8 workers, custom template
  synthdoc -n 5000 -w 8 -t my_report.tex -o datasets/lab

  # Use lualatex with a shorter timeout
  synthdoc --typesetter lualatex --typeset-timeout 60

  # Show all six augmentations of one image (writes into <dataset-dir>/preview)
  synthdoc --preview data/images/00000.png

  # Augment a folder of PNGs (writes into <dataset-dir>/augmented)
  synthdoc --augment-dir scans/

  # Machine-readable run summary
  synthdoc -n 50 --json > stats.json

OUTPUT LAYOUT:
  <dataset-dir>/images/{index:05}.png       clean raster (3 px per point)
  <dataset-dir>/images/{index:05}_aug.png   same page, one random augmentation
  <dataset-dir>/data.json                   manifest of successful samples
  <dataset-dir>/.work/job-{index:05}-*      per-job scratch (removed unless
                                            --keep-intermediates)

AUGMENTATIONS:
  RandomRotation, GaussianBlur, ImageDilation, Downscaling,
  RandomPerspective, ColorJitter (one per sample, uniformly chosen)

REQUIREMENTS:
  xelatex (or --typesetter) with fontspec + polyglossia on PATH
  libpdfium on the library path, or --pdfium-lib-dir

ISOLATION:
  Each page is read by pdfium in a child synthdoc process, so a renderer
  crash drops that sample only. --in-process trades this for less overhead.
"#;

/// Generate synthetic lab-report images for OCR training.
#[derive(Parser, Debug)]
#[command(
    name = "synthdoc",
    version,
    about = "Generate synthetic lab-report images for OCR training",
    long_about = "Render random lab reports through a LaTeX template, keep the ones that fit \
on one page, rasterise them and pair each with a randomly degraded copy. Writes PNGs plus a \
JSON manifest with the ground-truth text.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Number of samples to attempt.
    #[arg(short = 'n', long, env = "SYNTHDOC_COUNT", default_value_t = 100,
          value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,

    /// Maximum concurrent jobs. Default: number of hardware threads.
    #[arg(short, long, env = "SYNTHDOC_WORKERS")]
    workers: Option<usize>,

    /// Dataset directory (also the output root for --preview / --augment-dir).
    #[arg(short = 'o', long, env = "SYNTHDOC_DATASET_DIR", default_value = "data")]
    dataset_dir: PathBuf,

    /// Scratch directory for per-job sources and PDFs. Default: <dataset-dir>/.work.
    #[arg(long, env = "SYNTHDOC_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Template file. Default: the bundled lab-report template.
    #[arg(short, long, env = "SYNTHDOC_TEMPLATE")]
    template: Option<PathBuf>,

    /// Typesetting program.
    #[arg(long, env = "SYNTHDOC_TYPESETTER", default_value = "xelatex")]
    typesetter: String,

    /// Extra typesetter argument (repeatable). Replaces the default `-interaction=nonstopmode`.
    #[arg(long = "typesetter-arg", allow_hyphen_values = true)]
    typesetter_args: Vec<String>,

    /// Per-job typesetter timeout in seconds.
    #[arg(long, env = "SYNTHDOC_TYPESET_TIMEOUT", default_value_t = 120)]
    typeset_timeout: u64,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "SYNTHDOC_PDFIUM_LIB_DIR")]
    pdfium_lib_dir: Option<PathBuf>,

    /// Keep each job's scratch directory.
    #[arg(long, env = "SYNTHDOC_KEEP_INTERMEDIATES")]
    keep_intermediates: bool,

    /// Rasterise pages in this process instead of one child process per job.
    /// Faster to start, but a pdfium crash ends the whole run.
    #[arg(long, env = "SYNTHDOC_IN_PROCESS")]
    in_process: bool,

    /// Apply every augmentation to IMAGE and exit.
    #[arg(long, value_name = "IMAGE", conflicts_with = "augment_dir")]
    preview: Option<PathBuf>,

    /// Augment every PNG in DIR and exit.
    #[arg(long, value_name = "DIR")]
    augment_dir: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "SYNTHDOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SYNTHDOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SYNTHDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SYNTHDOC_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    // Started by a generation run to rasterise one page; see `synthdoc::worker`.
    if worker::is_worker_process() {
        return worker::serve_default().context("Worker failed");
    }
    run()
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let generating = cli.preview.is_none() && cli.augment_dir.is_none();
    let show_progress = generating && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Preview mode ─────────────────────────────────────────────────────
    if let Some(ref image) = cli.preview {
        let out_dir = cli.dataset_dir.join("preview");
        let written = preview_all(image, &out_dir)
            .await
            .with_context(|| format!("Failed to preview augmentations of {}", image.display()))?;
        if !cli.quiet {
            for p in &written {
                let label = p.kind.map(|k| k.name()).unwrap_or("Original");
                eprintln!("  {} {:<18} {}", green("✓"), label, dim(&p.path.display().to_string()));
            }
        }
        return Ok(());
    }

    // ── Augment-directory mode ───────────────────────────────────────────
    if let Some(ref source) = cli.augment_dir {
        let out_dir = cli.dataset_dir.join("augmented");
        let report = augment_directory(source, &out_dir)
            .await
            .with_context(|| format!("Failed to augment {}", source.display()))?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report.files).context("Failed to serialise report")?
            );
        }
        if !cli.quiet {
            eprintln!(
                "{} {} images augmented into {}  ({} failed)",
                if report.failed.is_empty() { green("✔") } else { cyan("⚠") },
                bold(&report.files.len().to_string()),
                out_dir.display(),
                report.failed.len(),
            );
            let total = report.files.len().max(1);
            for (name, count) in report.counts_by_kind() {
                eprintln!(
                    "   {:<18} {:>5}  {}",
                    name,
                    count,
                    dim(&format!("{:.1}%", count as f64 * 100.0 / total as f64))
                );
            }
        }
        return Ok(());
    }

    // ── Generate mode ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let manifest_path = config.manifest_path();

    let stats = generate_to_dir(&config)
        .await
        .context("Generation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} samples  {}ms  →  {}",
            if stats.dropped() == 0 { green("✔") } else { cyan("⚠") },
            stats.succeeded,
            stats.requested,
            stats.total_duration_ms,
            bold(&manifest_path.display().to_string()),
        );
        if stats.dropped() > 0 {
            eprintln!(
                "   {} multi-page  /  {} typesetter  /  {} unexpected",
                dim(&stats.validation_failures.to_string()),
                dim(&stats.tool_failures.to_string()),
                if stats.unexpected_failures > 0 {
                    red(&stats.unexpected_failures.to_string())
                } else {
                    dim("0")
                },
            );
        }
    }

    Ok(())
}

/// Map CLI args to `GenerationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .count(usize::try_from(cli.count).context("--count is too large")?)
        .dataset_dir(&cli.dataset_dir)
        .typesetter_program(&cli.typesetter)
        .typesetter_timeout_secs(cli.typeset_timeout)
        .keep_intermediates(cli.keep_intermediates);

    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref path) = cli.template {
        builder = builder.template_path(path);
    }
    if !cli.typesetter_args.is_empty() {
        builder = builder.typesetter_args(cli.typesetter_args.iter().cloned());
    }
    if let Some(ref dir) = cli.pdfium_lib_dir {
        builder = builder.pdfium_library_dir(dir);
    }
    if cli.in_process {
        builder = builder.isolation(Isolation::InProcess);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_safe() {
        let s = "Задание 7: xelatex завершился с ошибкой".repeat(4);
        let t = truncate(&s, 20);
        assert_eq!(t.chars().count(), 20);
        assert!(t.ends_with('\u{2026}'));
        assert_eq!(truncate("short", 20), "short");
    }

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "synthdoc",
            "-n",
            "7",
            "-w",
            "1",
            "-o",
            "/tmp/ds",
            "--typesetter",
            "lualatex",
            "--typesetter-arg",
            "-halt-on-error",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.count, 7);
        assert_eq!(config.workers, 1);
        assert_eq!(config.typesetter_program, "lualatex");
        assert_eq!(config.typesetter_args, vec!["-halt-on-error".to_string()]);
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/ds/data.json"));
        assert_eq!(config.isolation, Isolation::CurrentExe);

        let cli = Cli::parse_from(["synthdoc", "--in-process"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.isolation, Isolation::InProcess);
    }
}
