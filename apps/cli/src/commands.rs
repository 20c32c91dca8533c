//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use professoragent_core::{JobReport, JobService, ReportStatus};
use professoragent_jobs::JobPayload;
use professoragent_literature::{LiteratureAggregator, SearchOptions};
use professoragent_retrieval::DocumentIndex;
use professoragent_shared::{AppConfig, init_config, load_config, load_config_from};

/// Crates whose log output the verbosity flag controls.
const LOG_TARGETS: [&str; 6] = [
    "professoragent",
    "professoragent_shared",
    "professoragent_retrieval",
    "professoragent_literature",
    "professoragent_jobs",
    "professoragent_core",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ProfessorAgent: teaching and research assistant jobs.
#[derive(Parser)]
#[command(
    name = "professoragent",
    version,
    about = "Plan lessons, find grants and collaborators, and survey literature from a local corpus.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of `~/.professoragent/professoragent.toml`.
    #[arg(long, global = true, env = "PROFESSORAGENT_CONFIG")]
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Submit a job and follow it until every step has finished.
    Run {
        /// What the professor wants to achieve.
        #[arg(short, long)]
        goal: String,

        /// Free-text profile of the professor.
        #[arg(long)]
        profile_text: Option<String>,

        /// Research project idea used for grants and the proposal.
        #[arg(long)]
        project_idea: Option<String>,

        /// Status polling interval in milliseconds.
        #[arg(long, default_value_t = 250)]
        poll_ms: u64,
    },

    /// Search the local corpus.
    Retrieve {
        /// Free-text query.
        query: String,

        /// Maximum hits to return.
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        /// Restrict hits to one source type (e.g. faculty_profile, grant).
        #[arg(short, long)]
        source_type: Option<String>,

        /// Corpus file (defaults to the configured path).
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Search OpenAlex, Crossref, and arXiv.
    Literature {
        /// Free-text query.
        query: String,

        /// Results requested from each source.
        #[arg(short, long)]
        max_results: Option<usize>,

        /// Per-source request timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Manage configuration.
    Config {
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

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    let config = || -> Result<AppConfig> {
        Ok(match &config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        })
    };

    match cli.command {
        Command::Run {
            goal,
            profile_text,
            project_idea,
            poll_ms,
        } => {
            let payload = JobPayload {
                goal,
                profile_text,
                project_idea,
            };
            cmd_run(&config()?, payload, Duration::from_millis(poll_ms.max(10))).await
        }
        Command::Retrieve {
            query,
            top_k,
            source_type,
            corpus,
        } => {
            let path = match corpus {
                Some(path) => path,
                None => config()?.corpus.path,
            };
            cmd_retrieve(&path, &query, top_k, source_type.as_deref()).await
        }
        Command::Literature {
            query,
            max_results,
            timeout_secs,
        } => cmd_literature(&config()?, &query, max_results, timeout_secs).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config()?).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, payload: JobPayload, poll: Duration) -> Result<()> {
    let service = JobService::from_config(config)?;

    let submitted = service.submit(payload)?;
    let job_id = submitted.job_id.clone();
    info!(job_id = %job_id, "job queued");

    let progress = CliProgress::new()?;
    let report = loop {
        let report = service.status(&job_id);
        progress.update(&report);
        if report.status.is_terminal() {
            break report;
        }
        tokio::time::sleep(poll).await;
    };
    progress.finish();

    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.status {
        ReportStatus::Done => Ok(()),
        _ => Err(eyre!(
            "job {job_id} {}: {}",
            status_label(report.status),
            report.error.as_deref().unwrap_or("no error recorded")
        )),
    }
}

async fn cmd_retrieve(
    path: &Path,
    query: &str,
    top_k: usize,
    source_type: Option<&str>,
) -> Result<()> {
    let index = DocumentIndex::load(path)?;
    info!(documents = index.len(), query, top_k, "searching corpus");

    let hits = index.search(query, top_k, source_type);
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

async fn cmd_literature(
    config: &AppConfig,
    query: &str,
    max_results: Option<usize>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let aggregator = LiteratureAggregator::new(&config.literature)?;

    let mut options = SearchOptions::from(&config.literature);
    if let Some(max) = max_results {
        options.max_results_per_source = max;
    }
    if let Some(secs) = timeout_secs {
        options.timeout = Duration::from_secs(secs);
    }

    let spinner = CliProgress::new()?;
    spinner.message(format!("Searching literature for '{query}'"));
    let response = aggregator.search(query, options).await;
    spinner.finish();

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn status_label(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Queued => "queued",
        ReportStatus::Running => "running",
        ReportStatus::Done => "done",
        ReportStatus::Failed => "failed",
        ReportStatus::NotFound => "not found",
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner on stderr showing which step a job is on.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map_err(|e| eyre!("invalid progress template: {e}"))?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn message(&self, msg: String) {
        self.spinner.set_message(msg);
    }

    fn update(&self, report: &JobReport) {
        let finished = report
            .steps
            .iter()
            .filter(|s| s.status.is_terminal())
            .count();
        let total = report.steps.len();
        let msg = match report.current_step() {
            Some(step) => format!(
                "[{finished}/{total}] {}: {}",
                step.name,
                step.message.as_deref().unwrap_or("running")
            ),
            None => format!("[{finished}/{total}] {}", status_label(report.status)),
        };
        self.message(msg);
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}
