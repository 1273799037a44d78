//! CLI binary for prospectus-split.
//!
//! Maps flags onto `SplitConfig`, runs the pipeline and writes the JSON
//! payload to a file or stdout. `--inspect` prints the document structure
//! without touching a model.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use prospectus_split::{
    inspect, process, process_to_file, DocumentSummary, MergeGuard, ProgressCallback, SplitConfig,
    SplitProgressCallback, Stage, TargetTable,
};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Terminal styling ─────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Tone {
    Ok,
    Fail,
    Warn,
    Faint,
    Strong,
}

fn tone(t: Tone, s: &str) -> String {
    let code = match t {
        Tone::Ok => "32",
        Tone::Fail => "31",
        Tone::Warn => "33",
        Tone::Faint => "2",
        Tone::Strong => "1",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

// ── Progress ─────────────────────────────────────────────────────────────

/// One line of terminal state: stage names while the document is walked,
/// a table counter once descriptions start. Descriptions run concurrently,
/// so table events may arrive out of order.
struct TerminalProgress {
    line: ProgressBar,
    undescribed: AtomicUsize,
}

impl TerminalProgress {
    fn new() -> Arc<Self> {
        let line = ProgressBar::new_spinner();
        line.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        line.set_message("reading document");
        line.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self {
            line,
            undescribed: AtomicUsize::new(0),
        })
    }

    fn count_tables(&self, total: usize) {
        self.line.set_length(total as u64);
        self.line.set_position(0);
        self.line.set_style(
            ProgressStyle::with_template("{spinner:.yellow} describing tables {bar:32.yellow/240} {pos}/{len}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
    }
}

impl SplitProgressCallback for TerminalProgress {
    fn on_run_start(&self, paragraphs: usize, tables: usize) {
        self.line
            .println(tone(Tone::Strong, &format!("{paragraphs} paragraphs / {tables} tables")));
    }

    fn on_stage(&self, stage: Stage) {
        self.line.set_message(stage.label());
    }

    fn on_table_start(&self, _index: usize, total: usize) {
        if self.line.length() != Some(total as u64) {
            self.count_tables(total);
        }
    }

    fn on_table_complete(&self, _index: usize, _total: usize, _table_type: &str) {
        self.line.inc(1);
    }

    fn on_table_error(&self, index: usize, _total: usize, error: &str) {
        self.undescribed.fetch_add(1, Ordering::SeqCst);
        let short: String = error.chars().take(72).collect();
        self.line
            .println(format!("  table #{}: {}", index + 1, tone(Tone::Fail, &short)));
        self.line.inc(1);
    }

    fn on_target_resolved(&self, target: &str, id: Option<&str>) {
        self.line.println(match id {
            Some(id) => format!("  {} {target}  {}", tone(Tone::Ok, "+"), tone(Tone::Faint, id)),
            None => format!("  {} {target}  {}", tone(Tone::Faint, "-"), tone(Tone::Faint, "no match")),
        });
    }

    fn on_run_complete(&self, resolved_targets: usize, total_targets: usize) {
        self.line.finish_and_clear();
        let mark = if resolved_targets == total_targets {
            tone(Tone::Ok, "done")
        } else {
            tone(Tone::Warn, "partial")
        };
        let undescribed = self.undescribed.load(Ordering::SeqCst);
        let note = match undescribed {
            0 => String::new(),
            n => format!(", {n} tables undescribed"),
        };
        eprintln!("{mark}: {resolved_targets} of {total_targets} target tables bound{note}");
    }
}

// ── Arguments ────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"Examples:
  prospectus-split prospectus.docx                      payload on stdout
  prospectus-split prospectus.docx -o out.json          payload to a file
  prospectus-split --sections-only --no-llm-titles a.docx   no model needed
  prospectus-split --targets 资产负债表,现金流 a.docx     statements only
  prospectus-split --inspect a.docx                     structure only

Target tables:
  资产负债表 利润表 现金流 有息负债 受限资产 应收账款
  其他应收款 营业收入 对外担保 授信情况 保证人基本情况

Model selection (first match wins):
  --provider/--model, then EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL,
  then OPENAI_API_KEY, then whichever provider key is set
  (ANTHROPIC_API_KEY, GEMINI_API_KEY, ...).
"#;

/// Split bond prospectuses into sections and bind their financial tables.
#[derive(Parser, Debug)]
#[command(
    name = "prospectus-split",
    version,
    about = "Split bond-prospectus .docx files into sections and bind their financial tables",
    long_about = "Segment a bond prospectus (.docx, local file or URL) by its heading hierarchy, \
attach each table to its heading and caption, and ask a chat model which tables are the \
statements a credit report needs. Balance sheet and cash flow come out in 亿.",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Prospectus .docx path or http(s) URL.
    input: String,

    /// Output JSON file; stdout when omitted.
    #[arg(short, long, env = "PROSPECTUS_SPLIT_OUTPUT")]
    output: Option<PathBuf>,

    /// Chat model ID, e.g. gpt-4.1-nano.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Provider name: openai, anthropic, gemini, azure, ollama, openrouter...
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Parallel table descriptions and arbitrations.
    #[arg(short, long, env = "PROSPECTUS_SPLIT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Attempts per table or target when a reply is unusable.
    #[arg(long, env = "PROSPECTUS_SPLIT_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Fuzzy cut-off between a table's type and a target name (0–1).
    #[arg(long, env = "PROSPECTUS_SPLIT_SIMILARITY", default_value_t = 0.8)]
    similarity: f64,

    /// Comma-separated target tables (default: all).
    #[arg(long, env = "PROSPECTUS_SPLIT_TARGETS", value_delimiter = ',')]
    targets: Vec<String>,

    /// Treat undecided heading candidates as body text instead of asking the model.
    #[arg(long, env = "PROSPECTUS_SPLIT_NO_LLM_TITLES")]
    no_llm_titles: bool,

    /// Stop after sections and table contexts; no table selection.
    #[arg(long, env = "PROSPECTUS_SPLIT_SECTIONS_ONLY")]
    sections_only: bool,

    /// Describe every table, not only those whose caption names a statement.
    #[arg(long, env = "PROSPECTUS_SPLIT_NO_KEYWORD_FILTER")]
    no_keyword_filter: bool,

    /// Never merge caption-less tables beyond this many rows.
    #[arg(long, env = "PROSPECTUS_SPLIT_MERGE_MAX_ROWS")]
    merge_max_rows: Option<usize>,

    /// Only merge caption-less tables of the same width.
    #[arg(long, env = "PROSPECTUS_SPLIT_MERGE_SAME_WIDTH")]
    merge_same_width: bool,

    /// Reply token cap per model call.
    #[arg(long, env = "PROSPECTUS_SPLIT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature.
    #[arg(long, env = "PROSPECTUS_SPLIT_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Single-line JSON.
    #[arg(long)]
    compact: bool,

    /// No progress line on stderr.
    #[arg(long, env = "PROSPECTUS_SPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Print the document structure and exit; no model calls.
    #[arg(long)]
    inspect: bool,

    /// Debug logging.
    #[arg(short, long, env = "PROSPECTUS_SPLIT_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "PROSPECTUS_SPLIT_QUIET")]
    quiet: bool,

    /// Seconds allowed for downloading a URL input.
    #[arg(long, env = "PROSPECTUS_SPLIT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Seconds allowed per model call.
    #[arg(long, env = "PROSPECTUS_SPLIT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl Cli {
    fn shows_progress(&self) -> bool {
        !(self.quiet || self.no_progress || self.inspect)
    }

    /// Default log filter; `RUST_LOG` overrides it. The progress line owns
    /// stderr while it runs, so library logs drop to errors.
    fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet || self.shows_progress() {
            "error"
        } else {
            "info"
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())))
        .with_writer(io::stderr)
        .init();

    if cli.inspect {
        let summary = inspect(&cli.input).await.context("Failed to inspect document")?;
        print_summary(&cli.input, &summary);
        return Ok(());
    }

    let progress: Option<ProgressCallback> = cli
        .shows_progress()
        .then(|| TerminalProgress::new() as Arc<dyn SplitProgressCallback>);
    let config = build_config(&cli, progress)?;

    match cli.output {
        Some(ref path) => {
            let stats = process_to_file(&cli.input, path, &config)
                .await
                .context("Processing failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} → {}  ({} sections, {} tables, {} model calls, {}+{} tokens, {} ms)",
                    cli.input,
                    tone(Tone::Strong, &path.display().to_string()),
                    stats.sections,
                    stats.table_contexts,
                    stats.llm_calls,
                    stats.input_tokens,
                    stats.output_tokens,
                    stats.total_duration_ms,
                );
            }
        }
        None => {
            let output = process(&cli.input, &config).await.context("Processing failed")?;
            let mut out = BufWriter::new(io::stdout().lock());
            if cli.compact {
                serde_json::to_writer(&mut out, &output)
            } else {
                serde_json::to_writer_pretty(&mut out, &output)
            }
            .context("Failed to serialise output")?;
            writeln!(out).and_then(|_| out.flush()).context("Failed to write to stdout")?;

            if !cli.quiet && !cli.shows_progress() {
                eprintln!(
                    "{} sections, {}/{} targets bound, {} degraded items, {} ms",
                    output.stats.sections,
                    output.stats.targets_resolved,
                    config.targets.len(),
                    output.failures.len(),
                    output.stats.total_duration_ms
                );
            }
        }
    }

    Ok(())
}

fn print_summary(input: &str, summary: &DocumentSummary) {
    println!("{}", tone(Tone::Strong, input));
    println!(
        "  {} paragraphs, {} tables, {} styles, {} numbering definitions",
        summary.paragraphs, summary.tables, summary.styles, summary.numbering_definitions
    );
    println!("  {} paragraphs carry an outline level", summary.outline_entries);
    for title in &summary.first_level_titles {
        println!("  · {title}");
    }
}

/// Map CLI args to `SplitConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SplitConfig> {
    let mut builder = SplitConfig::builder()
        .targets(parse_targets(&cli.targets)?)
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .similarity_threshold(cli.similarity)
        .llm_title_fallback(!cli.no_llm_titles)
        .extract_tables(!cli.sections_only)
        .keyword_filter(!cli.no_keyword_filter)
        .merge_guard(MergeGuard {
            max_rows: cli.merge_max_rows,
            require_same_width: cli.merge_same_width,
        })
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--targets` names; empty means all.
fn parse_targets(names: &[String]) -> Result<Vec<TargetTable>> {
    let names: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return Ok(TargetTable::ALL.to_vec());
    }
    names
        .into_iter()
        .map(|n| TargetTable::from_name(n).with_context(|| format!("Unknown target table: '{n}'")))
        .collect()
}
