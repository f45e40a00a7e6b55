//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use foldscape_core::pipeline::{
    PipelineConfig, PipelineReport, ProgressReporter, Stages, VelocityStage, run_pipeline,
};
use foldscape_core::validate::{ValidationReport, validate_document};
use foldscape_shared::{AppConfig, init_config, load_config, load_config_from};
use foldscape_storage::{RecordStore, SnapshotMatch, SnapshotStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// How many structural errors are listed before the rest are summarized.
const MAX_LISTED_ERRORS: usize = 20;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FoldScape — keep the protein-ML tool catalog clean and current.
#[derive(Parser)]
#[command(
    name = "foldscape",
    version,
    about = "Validate, categorize and score the FoldScape repository catalog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.foldscape/foldscape.toml.
    #[arg(long, global = true, env = "FOLDSCAPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Options shared by every command that rewrites the store.
#[derive(clap::Args, Debug)]
pub(crate) struct StoreArgs {
    /// Directory holding repos.json and historical/ (overrides config).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Run every stage but do not write the store.
    #[arg(long)]
    pub dry_run: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check a record store file without modifying it.
    Validate {
        /// Path to the JSON record store.
        path: PathBuf,
    },

    /// Categorize, compute velocity, validate and publish.
    Run {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Only assign categories, then validate and publish.
    Categorize {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Only compute star velocity and trending, then validate and publish.
    Velocity {
        #[command(flatten)]
        store: StoreArgs,

        /// Age in days of the snapshot to compare against.
        #[arg(long)]
        days_back: Option<u32>,

        /// Minimum star gain to flag a repo as trending.
        #[arg(long)]
        threshold: Option<i64>,
    },

    /// Copy the current store into historical/<date>.json.
    Snapshot {
        /// Directory holding repos.json and historical/ (overrides config).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Snapshot date, YYYY-MM-DD (defaults to today).
        #[arg(long)]
        date: Option<NaiveDate>,
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
    /// Initialize config file with defaults.
    Init,
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
        0 => "foldscape=info",
        1 => "foldscape=debug",
        _ => "foldscape=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Validate { path } => cmd_validate(&path),
        Command::Run { store } => cmd_pipeline(config_path, &store, Stages::all(), None, None),
        Command::Categorize { store } => {
            cmd_pipeline(config_path, &store, Stages::categorize_only(), None, None)
        }
        Command::Velocity {
            store,
            days_back,
            threshold,
        } => cmd_pipeline(
            config_path,
            &store,
            Stages::velocity_only(),
            days_back,
            threshold,
        ),
        Command::Snapshot { data_dir, date } => {
            cmd_snapshot(config_path, data_dir.as_deref(), date)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// `--config` wins; otherwise the per-user file, or defaults if absent.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_validate(path: &Path) -> Result<ExitCode> {
    println!("Validating: {}", path.display());
    println!("{}", "-".repeat(50));

    let document = RecordStore::new(path).load_document()?;
    let report = validate_document(&document)?;

    print_validation(&report);
    Ok(exit_code(report.is_valid()))
}

fn cmd_pipeline(
    config_path: Option<&Path>,
    args: &StoreArgs,
    stages: Stages,
    days_back: Option<u32>,
    threshold: Option<i64>,
) -> Result<ExitCode> {
    let app_config = resolve_config(config_path)?;

    let mut config = PipelineConfig::from_app_config(&app_config, today());
    config.stages = stages;
    config.dry_run = args.dry_run;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(days) = days_back {
        config.velocity.days_back = days;
    }
    if let Some(threshold) = threshold {
        config.velocity.trending_threshold = threshold;
    }

    info!(
        data_dir = %config.data_dir.display(),
        categorize = stages.categorize,
        velocity = stages.velocity,
        dry_run = config.dry_run,
        "running pipeline"
    );

    let reporter = CliProgress::new();
    let report = run_pipeline(&config, &reporter)?;

    print_pipeline(&report);
    Ok(exit_code(report.succeeded()))
}

fn cmd_snapshot(
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
    date: Option<NaiveDate>,
) -> Result<ExitCode> {
    let app_config = resolve_config(config_path)?;
    let data_dir = data_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&app_config.paths.data_dir));
    let date = date.unwrap_or_else(today);

    let records = RecordStore::in_data_dir(&data_dir).load_records()?;
    if records.is_empty() {
        return Err(eyre!("refusing to snapshot an empty record store"));
    }

    let snapshot = SnapshotStore::in_data_dir(&data_dir).save(date, &records)?;
    info!(%date, records = records.len(), "snapshot written");

    println!(
        "Saved {} repos to {}",
        records.len(),
        snapshot.path.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_validation(report: &ValidationReport) {
    for warning in &report.warnings {
        println!("WARNING: {warning}");
    }

    if report.is_valid() {
        println!("VALID: {} repos, no errors", report.record_count);
    } else {
        println!("\nFOUND {} ERROR(S):\n", report.errors.len());
        for error in report.errors.iter().take(MAX_LISTED_ERRORS) {
            println!("  - {error}");
        }
        if report.errors.len() > MAX_LISTED_ERRORS {
            println!("  ... and {} more", report.errors.len() - MAX_LISTED_ERRORS);
        }
        println!();
    }

    let coverage = &report.coverage;
    println!(
        "Validated: {} repos | Categorized: {} | Errors: {}",
        report.record_count,
        coverage.categorized,
        report.errors.len()
    );

    if coverage.total > 0 {
        println!("\nCoverage:");
        for (label, count) in [
            ("Categorized", coverage.categorized),
            ("GPU requirements", coverage.with_gpu_requirement),
            ("Expression systems", coverage.with_expression_systems),
        ] {
            println!(
                "  - {label}: {count}/{} ({}%)",
                coverage.total,
                coverage.percent(count)
            );
        }
    }
}

fn print_pipeline(report: &PipelineReport) {
    println!();
    println!("  Run:     {}", report.run_id);

    if !report.cleared_categories.is_empty() {
        println!(
            "  Cleared unknown category labels: {}",
            report.cleared_categories.join(", ")
        );
    }

    if report.stopped_before_stages {
        println!("  Input failed validation; nothing was changed.");
        println!("  Fix the listed fields in the store and run again.");
        println!();
        print_validation(&report.validation);
        return;
    }

    if let Some(categorize) = &report.categorize {
        println!(
            "  Categorized: {} ({} by override), {} uncategorized",
            categorize.categorized,
            categorize.from_overrides,
            categorize.uncategorized.len()
        );
        for (category, count) in &categorize.breakdown {
            println!("    {category}: {count}");
        }
    }

    for stage in &report.velocity {
        match stage {
            VelocityStage::Computed { selection, report } => {
                let matched = match selection.matched {
                    SnapshotMatch::Exact => String::from("exact"),
                    SnapshotMatch::Fallback { requested } => {
                        format!("fallback, nothing for {requested}")
                    }
                };
                println!(
                    "  {}: against {} ({matched}), {} trending",
                    report.horizon.field(),
                    selection.snapshot.date,
                    report.trending.len()
                );
                for repo in &report.trending {
                    println!("    {} (+{})", repo.name, repo.velocity);
                }
            }
            VelocityStage::InsufficientHistory { horizon } => {
                println!("  {}: skipped, no historical snapshot", horizon.field());
            }
        }
    }

    match &report.saved {
        Some(saved) => println!("  Saved:   {} ({} repos)", saved.path.display(), saved.repo_count),
        None if report.dry_run => println!("  Dry run: store not written"),
        None => println!("  Not saved: output failed validation"),
    }
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    print_validation(&report.validation);
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn stage_skipped(&self, stage: &str, reason: &str) {
        self.spinner.println(format!("  skipped {stage}: {reason}"));
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}
