//! CLI binary for energy-extract.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `ExtractionConfig` / `CompareOptions` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use energy_extract::pipeline::{jsonl, stage};
use energy_extract::{
    compare_directories, extract_document, load_ingredients, run_batch_dir, run_chain_from,
    CompareOptions, ExtractionConfig, ExtractionProgressCallback, MatchStrategy,
    ProgressCallback, StageKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// What one tick of the bar stands for.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Unit {
    Stage,
    Document,
}

/// Terminal progress callback: a live bar plus one log line per finished
/// stage (chain) or document (batch).
struct CliProgressCallback {
    bar: ProgressBar,
    unit: Unit,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(unit: Unit, len: u64) -> Arc<Self> {
        let label = match unit {
            Unit::Stage => "stages",
            Unit::Document => "PDFs",
        };
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {label}  \
             ⏱ {{elapsed_precise}}  {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(len);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unit,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn start_clock(&self) {
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn short(error: &str) -> String {
        if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_documents} PDFs…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, path: &Path) {
        if self.unit == Unit::Document {
            self.start_clock();
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn on_stage_start(&self, stage: StageKind) {
        if self.unit == Unit::Stage {
            self.start_clock();
            self.bar.set_message(format!("stage {stage}"));
        }
    }

    fn on_stage_complete(&self, stage: StageKind, metrics: usize) {
        if self.unit == Unit::Stage {
            self.bar.println(format!(
                "  {} Stage {:<14} {}  {}",
                green("✓"),
                stage.to_string(),
                dim(&format!("{metrics:>4} metrics")),
                self.elapsed(),
            ));
            self.bar.inc(1);
        }
    }

    fn on_stage_error(&self, stage: StageKind, error: &str) {
        if self.unit == Unit::Stage {
            self.errors.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!(
                "  {} Stage {:<14} {}  {}",
                red("✗"),
                stage.to_string(),
                red(&Self::short(error)),
                self.elapsed(),
            ));
            self.bar.finish_and_clear();
        }
    }

    fn on_document_complete(&self, index: usize, total: usize, metrics: usize) {
        if self.unit == Unit::Stage {
            self.bar.finish_and_clear();
            return;
        }
        self.bar.println(format!(
            "  {} PDF {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{metrics:>4} metrics")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} PDF {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&Self::short(error)),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let failed = total_documents.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} PDFs extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} PDFs extracted  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Three-stage chain over data/test_doc.pdf
  energy-extract chain

  # Re-run only stage 3 on the persisted stage 2 output
  energy-extract chain --from-stage 3

  # Single-shot extraction of every PDF in data/pdfs/
  energy-extract batch

  # Score generated JSONL against expected JSONL
  energy-extract compare --generated data/generated_all_in_one --expected data/expected

  # Check a persisted stage output against its schema
  energy-extract validate 2 data/output/out_step_2.txt

DATA LAYOUT (relative to --data-dir, default ./data):
  test_doc.pdf                     chain input
  pdfs/*.pdf                       batch input
  templates/system_instructions_step_{1,2,3}.txt
  templates/system_instructions.txt
  output/out_step_{1,2,3}.txt      chain outputs
  output_all_in_one/out_step.txt   last single-shot result
  generated_all_in_one/*.jsonl     flattened batch results

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            API key (GOOGLE_API_KEY is also accepted)
  GEMINI_BASE_URL           Override the API endpoint
  ENERGY_EXTRACT_MODEL      Model ID (default gemini-2.0-flash)
  ENERGY_EXTRACT_DATA_DIR   Data directory (default ./data)
  RUST_LOG                  Log filter, e.g. energy_extract=debug
"#;

/// Extract energy-consumption metrics from PDF reports with a hosted LLM.
#[derive(Parser, Debug)]
#[command(
    name = "energy-extract",
    version,
    about = "Extract energy-consumption metrics from PDF reports with a hosted LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root of the input/output data layout.
    #[arg(long, global = true, env = "ENERGY_EXTRACT_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Model ID (default gemini-2.0-flash).
    #[arg(long, global = true, env = "ENERGY_EXTRACT_MODEL")]
    model: Option<String>,

    /// API key for the generation service.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API endpoint.
    #[arg(long, global = true, env = "GEMINI_BASE_URL")]
    base_url: Option<String>,

    /// Per-request timeout in seconds (default: wait indefinitely).
    #[arg(long, global = true, env = "ENERGY_EXTRACT_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Max output tokens per call.
    #[arg(long, global = true, env = "ENERGY_EXTRACT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "ENERGY_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ENERGY_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "ENERGY_EXTRACT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the three-stage chain (identify → extract → classify) on one PDF.
    Chain {
        /// PDF to process (default: <data-dir>/test_doc.pdf).
        pdf: Option<PathBuf>,

        /// First stage to run (1, 2 or 3); earlier outputs are read from disk.
        #[arg(long, default_value = "1")]
        from_stage: StageKind,

        /// Accept stage 2/3 output even if its metric list diverges from the input.
        #[arg(long)]
        no_verify_alignment: bool,
    },

    /// Single-shot extraction of one PDF.
    Single {
        /// PDF to process (default: <data-dir>/test_doc.pdf).
        pdf: Option<PathBuf>,
    },

    /// Single-shot extraction of every PDF in a directory.
    Batch {
        /// Directory of PDFs (default: <data-dir>/pdfs).
        dir: Option<PathBuf>,
    },

    /// Compare generated JSONL files against expected ones.
    Compare {
        /// Directory of generated .jsonl files (default: <data-dir>/generated).
        #[arg(long)]
        generated: Option<PathBuf>,

        /// Directory of expected .jsonl files (default: <data-dir>/expected).
        #[arg(long)]
        expected: Option<PathBuf>,

        /// Combined match log.
        #[arg(long, default_value = "matches.jsonl")]
        matches: PathBuf,

        /// Per-file accuracy summary.
        #[arg(long, default_value = "accuracy.txt")]
        accuracy: PathBuf,

        /// How expected records are paired with generated ones.
        #[arg(long, value_enum, default_value = "first-match")]
        strategy: StrategyArg,
    },

    /// Flatten a persisted extraction result's metrics into JSONL.
    ToJsonl {
        /// Extraction result JSON (default: <data-dir>/output_all_in_one/out_step.txt).
        #[arg(long)]
        input: Option<PathBuf>,

        /// JSONL file to write.
        output: PathBuf,
    },

    /// Validate a persisted stage output against the stage schema.
    Validate {
        /// Stage: 1, 2, 3 or single-shot.
        stage: StageKind,

        /// JSON file to check (default: the stage's output file).
        file: Option<PathBuf>,
    },

    /// Load a categorised ingredients file and list its energy items.
    Ingredients {
        /// Ingredients JSON (default: <data-dir>/output/ingredients.txt).
        file: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    FirstMatch,
    OneToOne,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::FirstMatch => MatchStrategy::FirstMatch,
            StrategyArg::OneToOne => MatchStrategy::OneToOne,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for the model-calling commands.
    let calls_model = matches!(
        cli.command,
        Command::Chain { .. } | Command::Single { .. } | Command::Batch { .. }
    );
    let show_progress = calls_model && !cli.quiet && !cli.no_progress && !cli.json;
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

    match cli.command {
        Command::Chain {
            ref pdf,
            from_stage,
            no_verify_alignment,
        } => {
            let progress = show_progress.then(|| {
                let stages = StageKind::CHAIN
                    .iter()
                    .skip_while(|s| **s != from_stage)
                    .count();
                CliProgressCallback::new(Unit::Stage, stages as u64) as ProgressCallback
            });
            let mut config = build_config(&cli, progress)?;
            config.verify_alignment = !no_verify_alignment;
            let pdf = pdf.clone().unwrap_or_else(|| config.layout.test_document());

            let output = run_chain_from(&pdf, from_stage, &config)
                .await
                .context("Chain failed")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?
                );
            } else if !cli.quiet {
                for path in &output.written {
                    eprintln!("  → {}", bold(&path.display().to_string()));
                }
                eprintln!(
                    "{}  {} metrics  {}ms  {} tokens in / {} tokens out",
                    green("✔"),
                    output.metrics.len(),
                    output.total_duration_ms,
                    dim(&output.total_input_tokens().to_string()),
                    dim(&output.total_output_tokens().to_string()),
                );
            }
        }

        Command::Single { ref pdf } => {
            let config = build_config(&cli, None)?;
            let pdf = pdf.clone().unwrap_or_else(|| config.layout.test_document());
            let result = extract_document(&pdf, &config)
                .await
                .context("Extraction failed")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialise output")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} metrics for {} ({})  →  {}",
                    green("✔"),
                    result.metrics.len(),
                    result.metadata.organization_name,
                    result.year,
                    bold(
                        &config
                            .layout
                            .stage_output(StageKind::SingleShot)
                            .display()
                            .to_string()
                    ),
                );
            }
        }

        Command::Batch { ref dir } => {
            let progress = show_progress
                .then(|| CliProgressCallback::new(Unit::Document, 0) as ProgressCallback);
            let config = build_config(&cli, progress)?;
            let dir = dir.clone().unwrap_or_else(|| config.layout.pdf_dir());

            let output = run_batch_dir(&dir, &config)
                .await
                .context("Batch failed")?;
            let stats = &output.stats;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?
                );
            } else if !cli.quiet {
                if !show_progress {
                    for doc in output.documents.iter().filter(|d| d.error.is_some()) {
                        eprintln!(
                            "  {} {}: {}",
                            red("✗"),
                            doc.document.display(),
                            doc.error.as_deref().unwrap_or_default()
                        );
                    }
                }
                eprintln!(
                    "{}  {}/{} PDFs  {} metrics  {}ms  →  {}",
                    if stats.failed == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    stats.succeeded,
                    stats.total_documents,
                    stats.total_metrics,
                    stats.total_duration_ms,
                    bold(&config.layout.generated_dir().display().to_string()),
                );
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&stats.total_input_tokens.to_string()),
                    dim(&stats.total_output_tokens.to_string()),
                );
            }
            if stats.total_documents > 0 && stats.succeeded == 0 {
                anyhow::bail!("all {} PDFs failed", stats.total_documents);
            }
        }

        Command::Compare {
            ref generated,
            ref expected,
            ref matches,
            ref accuracy,
            strategy,
        } => {
            let options = CompareOptions {
                generated_dir: generated
                    .clone()
                    .unwrap_or_else(|| cli.data_dir.join("generated")),
                expected_dir: expected
                    .clone()
                    .unwrap_or_else(|| cli.data_dir.join("expected")),
                matches_path: matches.clone(),
                accuracy_path: accuracy.clone(),
                strategy: strategy.into(),
            };
            let report = compare_directories(&options).context("Comparison failed")?;

            for name in &report.missing {
                println!("File {} not found in {}", name, options.generated_dir.display());
            }
            for (name, reason) in &report.failed {
                eprintln!("{} {}: {}", red("✗"), name, reason);
            }
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else {
                for file in &report.files {
                    println!("{}", file.accuracy_line());
                }
                if !cli.quiet {
                    eprintln!(
                        "{}  {} files compared, overall {:.2}%  →  {}, {}",
                        green("✔"),
                        report.files.len(),
                        report.overall_accuracy(),
                        bold(&options.accuracy_path.display().to_string()),
                        bold(&options.matches_path.display().to_string()),
                    );
                }
            }
        }

        Command::ToJsonl {
            ref input,
            ref output,
        } => {
            let input = input.clone().unwrap_or_else(|| {
                energy_extract::DataLayout::new(&cli.data_dir).stage_output(StageKind::SingleShot)
            });
            let count = jsonl::convert_json_to_jsonl(&input, output)
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            if !cli.quiet {
                println!("Conversion complete. {count} records saved to {}", output.display());
            }
        }

        Command::Validate { stage: kind, ref file } => {
            let file = file.clone().unwrap_or_else(|| {
                energy_extract::DataLayout::new(&cli.data_dir).stage_output(kind)
            });
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match stage::parse_and_validate(kind, &text) {
                Ok(_) => println!("{} {} conforms to the stage {} schema", green("✔"), file.display(), kind),
                Err(e) => anyhow::bail!("{} does not conform: {}", file.display(), e),
            }
        }

        Command::Ingredients { ref file } => {
            let file = file.clone().unwrap_or_else(|| {
                energy_extract::DataLayout::new(&cli.data_dir).ingredients()
            });
            let data = load_ingredients(&file)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data).context("Failed to serialise data")?
                );
            } else {
                println!("Energy Data Year: {}", data.year);
                if let Some(sources) = data.metadata.get("data_sources") {
                    println!("Sources: {}", sources.as_str().unwrap_or(&sources.to_string()));
                }
                println!("\nRenewable Energy Items:");
                for item in &data.renewable {
                    println!("{item}");
                }
                println!("\nNon-Renewable Energy Items:");
                for item in &data.non_renewable {
                    println!("{item}");
                }
            }
        }
    }

    Ok(())
}

/// Map global CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .data_dir(&cli.data_dir)
        .max_output_tokens(cli.max_tokens);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
