//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use wikimig_core::{
    CancelToken, ProgressReporter, RunContext, RunInputs, RunOutcome, emit_outputs, run_pipeline,
    score_document,
};
use wikimig_inventory::{CsvInventory, scan_corpus};
use wikimig_shared::{MigrationError, PipelineConfig, Points, Ruleset, init_config, load_config};

/// Exit code when blockers remain.
const EXIT_BLOCKED: i32 = 1;

/// Exit code after Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// wikimig: migrate markdown documentation to MediaWiki.
#[derive(Parser)]
#[command(
    name = "wikimig",
    version,
    about = "Normalize, cross-link, score and validate a markdown corpus for MediaWiki.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./wikimig.toml, then ~/.wikimig/wikimig.toml).
    #[arg(long, global = true, env = "WIKIMIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Output format for `score`.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum ScoreFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full migration pipeline over a corpus.
    Run {
        /// Source documentation tree.
        #[arg(long)]
        source: PathBuf,

        /// Converter output tree (`.wiki` files mirroring the source tree).
        #[arg(long)]
        converted: Option<PathBuf>,

        /// Migration inventory CSV.
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Output directory for pages and reports.
        #[arg(short, long)]
        out: PathBuf,

        /// Commit proposed cross-links instead of only reporting them.
        #[arg(long)]
        accept_proposals: bool,

        /// Write page markup even when blockers remain.
        #[arg(long)]
        force_emit: bool,

        /// Worker pool size (0 = one per core).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Score a single document without a corpus.
    Score {
        /// Markdown or wiki file to score.
        file: PathBuf,

        #[arg(long, default_value = "text")]
        format: ScoreFormat,
    },

    /// Build a migration inventory CSV from a source tree.
    Inventory {
        /// Source documentation tree.
        #[arg(long)]
        source: PathBuf,

        /// CSV file to write.
        #[arg(short, long)]
        output: PathBuf,

        /// Value for the inventory's source type column.
        #[arg(long, default_value = "markdown")]
        source_type: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init {
        /// Where to write it (defaults to ~/.wikimig/wikimig.toml).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wikimig=info",
        1 => "wikimig=debug",
        _ => "wikimig=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command and return the process exit code.
pub(crate) async fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            source,
            converted,
            inventory,
            out,
            accept_proposals,
            force_emit,
            workers,
        } => {
            let inputs = RunInputs {
                source_dir: source,
                converted_dir: converted,
                inventory,
            };
            let options = RunOptions {
                out,
                accept_proposals,
                force_emit,
                workers,
            };
            cmd_run(config_path, inputs, options).await
        }
        Command::Score { file, format } => cmd_score(config_path, &file, &format),
        Command::Inventory {
            source,
            output,
            source_type,
        } => cmd_inventory(config_path, &source, &output, &source_type),
        Command::Config { action } => match action {
            ConfigAction::Init { path } => cmd_config_init(path.as_deref()),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load_ruleset(config_path: Option<&Path>) -> Result<Ruleset> {
    let config = load_config(config_path)?;
    Ok(Ruleset::compile(&config)?)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunOptions {
    out: PathBuf,
    accept_proposals: bool,
    force_emit: bool,
    workers: Option<usize>,
}

async fn cmd_run(config_path: Option<&Path>, inputs: RunInputs, options: RunOptions) -> Result<i32> {
    if !inputs.source_dir.is_dir() {
        return Err(eyre!(
            "source directory '{}' does not exist",
            inputs.source_dir.display()
        ));
    }

    let mut ctx = RunContext::new(load_ruleset(config_path)?);
    ctx.accept_proposals |= options.accept_proposals;
    if let Some(workers) = options.workers {
        ctx.workers = workers;
    }

    info!(
        source = %inputs.source_dir.display(),
        out = %options.out.display(),
        accept_proposals = ctx.accept_proposals,
        "starting migration run"
    );

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let reporter = CliProgress::new();
    let result = run_pipeline(&inputs, &ctx, &cancel, &reporter).await;
    watcher.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(MigrationError::Cancelled { completed, total }) => {
            reporter.spinner.finish_and_clear();
            eprintln!("Run cancelled after {completed}/{total} units; nothing was written.");
            return Ok(EXIT_CANCELLED);
        }
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let emitted = emit_outputs(&options.out, &outcome, options.force_emit)?;
    print_run_summary(&outcome, emitted.pages_written, emitted.markup_withheld, &options.out);

    if outcome.report.is_publishable() {
        Ok(0)
    } else {
        Ok(EXIT_BLOCKED)
    }
}

fn print_run_summary(outcome: &RunOutcome, pages_written: usize, withheld: bool, out: &Path) {
    let summary = &outcome.report.summary;

    println!();
    if outcome.report.is_publishable() {
        println!("  Migration run complete: publishable.");
    } else {
        println!("  Migration run complete: {} blocker(s).", summary.blockers);
    }
    println!("  Units:     {}", summary.units);
    for (status, count) in summary.by_status.iter().filter(|(_, n)| **n > 0) {
        println!("    {status:<16} {count}");
    }
    if let Some(scores) = &summary.scores {
        println!(
            "  Scores:    min {} / mean {} / max {}",
            scores.min, scores.mean, scores.max
        );
    }
    println!("  Warnings:  {}", summary.warnings);
    println!("  Proposals: {}", outcome.proposals.len());
    if withheld {
        println!("  Pages:     withheld (use --force-emit to write anyway)");
    } else {
        println!("  Pages:     {pages_written}");
    }
    println!("  Output:    {}", out.display());

    if !outcome.report.blockers.is_empty() {
        println!();
        println!("  Blockers:");
        for issue in &outcome.report.blockers {
            println!("    - {}: {}", issue.subject, issue.message);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn unit_processed(&self, source_path: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {source_path}"));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// score
// ---------------------------------------------------------------------------

fn cmd_score(config_path: Option<&Path>, file: &Path, format: &ScoreFormat) -> Result<i32> {
    let ruleset = load_ruleset(config_path)?;
    let text = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let source_path = file.to_string_lossy().replace('\\', "/");

    let unit = score_document(&source_path, &text, &ruleset);
    let Some(score) = &unit.score else {
        return Err(eyre!("'{}' could not be scored", file.display()));
    };
    let possible: Points = score.criteria.values().map(|c| c.possible).sum();

    match format {
        ScoreFormat::Json => {
            let value = serde_json::json!({
                "source_path": unit.source_path,
                "target_page_name": unit.target_page_name,
                "status": unit.status.as_str(),
                "word_count": unit.word_count,
                "categories": unit.categories,
                "possible": possible,
                "score": score,
                "warnings": unit.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ScoreFormat::Text => {
            println!();
            println!("  {} -> {}", unit.source_path, unit.target_page_name);
            println!("  Score: {} / {possible}", score.total);
            for (criterion, value) in &score.criteria {
                println!("    {:<18} {:>5} / {}", criterion.to_string(), value.earned, value.possible);
            }
            if !score.notes.is_empty() {
                println!();
                for note in &score.notes {
                    println!("  - {note}");
                }
            }
            if !unit.warnings.is_empty() {
                println!();
                println!("  Warnings: {}", unit.warnings.len());
                for warning in &unit.warnings {
                    println!("  - {}", warning.message);
                }
            }
            println!();
        }
    }
    Ok(0)
}

// ---------------------------------------------------------------------------
// inventory
// ---------------------------------------------------------------------------

fn cmd_inventory(
    config_path: Option<&Path>,
    source: &Path,
    output: &Path,
    source_type: &str,
) -> Result<i32> {
    if !source.is_dir() {
        return Err(eyre!("source directory '{}' does not exist", source.display()));
    }
    let ruleset = load_ruleset(config_path)?;
    let records = scan_corpus(source, source_type, &ruleset)?;
    let inventory = CsvInventory::from_records(records);
    inventory.save(output)?;

    info!(rows = inventory.len(), output = %output.display(), "inventory written");
    println!("Inventory with {} rows written to: {}", inventory.len(), output.display());
    Ok(0)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&Path>) -> Result<i32> {
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(0)
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<i32> {
    let config: PipelineConfig = load_config(config_path)?;
    // Compile so an invalid file is reported here rather than at run time.
    Ruleset::compile(&config)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(0)
}
