//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use ingestflow_core::{
    BatchReport, BatchReporter, IngestionScheduler, Job, PipelineExecutor, RangeSync,
};
use ingestflow_registry::{ToolRegistry, register_builtin_tools};
use ingestflow_shared::{
    AppConfig, AuditStore, IngestflowError, IngestionBatch, JobId, JobOutcome, init_config,
    load_config, source_api_key,
};
use ingestflow_source::LifelogClient;
use ingestflow_storage::Storage;
use serde_json::json;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ingestflow: run lifelog records through versioned tool pipelines.
#[derive(Parser)]
#[command(
    name = "ingestflow",
    version,
    about = "Ingest lifelog records on a schedule and run them through tool pipelines.",
    long_about = None,
)]
pub(crate) struct Cli {
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run text through the configured pipeline as one job.
    Run {
        /// Text to process.
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Fetch one day (or a range of days) of records and run each through the pipeline.
    Ingest {
        /// Day to ingest (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long, conflicts_with_all = ["from", "resume"])]
        date: Option<NaiveDate>,

        /// First day of a range; one batch runs per day.
        #[arg(long, conflicts_with = "resume")]
        from: Option<NaiveDate>,

        /// Last day of the range, inclusive. Defaults to today (UTC).
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Continue from the last completed day up to today.
        #[arg(long)]
        resume: bool,

        /// Timezone of the date window. Defaults to `schedule.timezone`.
        #[arg(long)]
        timezone: Option<String>,

        /// Maximum records. Defaults to `schedule.limit`.
        #[arg(long)]
        limit: Option<u32>,

        /// Concurrent pipeline runs. Defaults to `schedule.concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run an ingestion batch on every cron tick.
    Schedule {
        /// Cron expression (5 or 6 fields). Defaults to `schedule.cron`.
        #[arg(long)]
        cron: Option<String>,

        /// Run a single batch immediately and exit.
        #[arg(long)]
        once: bool,
    },

    /// List registered tools.
    Tools,

    /// Show the stage events of a job or of a source record.
    Logs {
        /// Job id.
        #[arg(long, required_unless_present = "source", conflicts_with = "source")]
        job: Option<String>,

        /// Source record id.
        #[arg(long)]
        source: Option<String>,
    },

    /// Show the persisted result of a job.
    Result {
        /// Job id.
        #[arg(long)]
        job: String,
    },

    /// Show the most recent persisted results.
    Results {
        /// Maximum results, newest first.
        #[arg(long, default_value_t = 10)]
        limit: u32,
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

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries results.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ingestflow=info",
        1 => "ingestflow=debug",
        _ => "ingestflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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

/// Process exit code for a failed command: 2 when the upstream source is
/// unavailable, 1 otherwise.
pub(crate) fn exit_code(report: &color_eyre::Report) -> i32 {
    match report
        .chain()
        .find_map(|e| e.downcast_ref::<IngestflowError>())
    {
        Some(IngestflowError::SourceUnavailable(_)) => 2,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { text, file } => cmd_run(text, file).await,
        Command::Ingest {
            date,
            from,
            to,
            resume,
            timezone,
            limit,
            concurrency,
        } => {
            let window = match (from, resume) {
                (Some(from), _) => Window::Range { from, to },
                (None, true) => Window::Resume,
                (None, false) => Window::Day(date),
            };
            cmd_ingest(window, timezone, limit, concurrency).await
        }
        Command::Schedule { cron, once } => cmd_schedule(cron.as_deref(), once).await,
        Command::Tools => cmd_tools().await,
        Command::Logs { job, source } => cmd_logs(job.as_deref(), source.as_deref()).await,
        Command::Result { job } => cmd_result(&job).await,
        Command::Results { limit } => cmd_results(limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Registry with the built-in tools and the `[tools]` overrides applied.
/// Fails if a configured stage is not registered or is disabled.
fn build_registry(config: &AppConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::with_policy(config.pipeline.duplicate_tools);
    register_builtin_tools(&mut registry)?;
    registry
        .configure_all(&config.tools)
        .wrap_err("[tools] configures a tool that is not registered")?;

    for stage in &config.pipeline.stages {
        registry
            .lookup(stage)
            .wrap_err("pipeline.stages names a tool that is not available")?;
    }
    Ok(registry)
}

async fn open_store(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = config.store.resolved_path()?;
    Ok(Arc::new(Storage::open(&path).await?))
}

async fn open_store_readonly(config: &AppConfig) -> Result<Storage> {
    let path = config.store.resolved_path()?;
    Ok(Storage::open_readonly(&path).await?)
}

fn build_executor(config: &AppConfig, storage: &Arc<Storage>) -> Result<PipelineExecutor> {
    let registry = build_registry(config)?;
    let store: Arc<dyn AuditStore> = storage.clone();
    Ok(PipelineExecutor::new(Arc::new(registry), store))
}

fn build_scheduler(
    config: &AppConfig,
    storage: &Arc<Storage>,
    concurrency: usize,
) -> Result<IngestionScheduler> {
    let api_key = source_api_key(config)?;
    let fetcher = Arc::new(LifelogClient::new(&config.source, api_key)?);
    let executor = build_executor(config, storage)?;
    Ok(
        IngestionScheduler::new(executor, fetcher, config.pipeline.stages.clone())
            .with_concurrency(concurrency),
    )
}

/// Parse a cron expression. Five-field expressions get a leading seconds field.
fn parse_cron(expr: &str) -> std::result::Result<cron::Schedule, cron::error::Error> {
    if expr.split_whitespace().count() == 5 {
        cron::Schedule::from_str(&format!("0 {expr}"))
    } else {
        cron::Schedule::from_str(expr)
    }
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    JobId::from_str(raw).map_err(|e| eyre!("invalid job id '{raw}': {e}"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(text: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Err(eyre!("provide TEXT or --file")),
    };

    let config = load_config()?;
    let storage = open_store(&config).await?;
    let executor = build_executor(&config, &storage)?;

    let mut job = Job::new(json!({ "text": text }));
    info!(job_id = %job.id, "running pipeline");
    let outcome = executor
        .execute_job(&mut job, &config.pipeline.stages)
        .await;
    storage.close().await?;

    let result = outcome?;
    print_json(&JobOutcome {
        job_id: job.id,
        result,
    })
}

/// Which days an `ingest` run covers.
enum Window {
    Day(Option<NaiveDate>),
    Range {
        from: NaiveDate,
        to: Option<NaiveDate>,
    },
    Resume,
}

async fn cmd_ingest(
    window: Window,
    timezone: Option<String>,
    limit: Option<u32>,
    concurrency: Option<usize>,
) -> Result<()> {
    let config = load_config()?;
    let timezone = timezone.unwrap_or_else(|| config.schedule.timezone.clone());
    let limit = limit.unwrap_or(config.schedule.limit);
    let concurrency = concurrency.unwrap_or(config.schedule.concurrency as usize);
    let today = Utc::now().date_naive();

    let storage = open_store(&config).await?;
    let scheduler = build_scheduler(&config, &storage, concurrency)?;
    let reporter = CliProgress::new();

    let printed = match window {
        Window::Day(date) => {
            let batch = IngestionBatch {
                date: date.unwrap_or(today),
                timezone,
                limit,
            };
            info!(date = %batch.date, timezone = %batch.timezone, limit = batch.limit, "ingesting batch");
            let outcome = scheduler.run_batch_with_progress(&batch, &reporter).await;
            reporter.finish();
            outcome.map_err(Into::into).and_then(|o| print_json(&o))
        }
        Window::Range { from, to } => {
            let sync = RangeSync::new(scheduler, storage.clone());
            let to = to.unwrap_or(today);
            info!(%from, %to, %timezone, limit, "ingesting range");
            let report = sync
                .sync_range(from, to, &timezone, limit, &reporter)
                .await;
            reporter.finish();
            report.map_err(Into::into).and_then(|r| print_json(&r))
        }
        Window::Resume => {
            let sync = RangeSync::new(scheduler, storage.clone());
            let report = sync.resume(today, &timezone, limit, &reporter).await;
            reporter.finish();
            report.map_err(Into::into).and_then(|r| print_json(&r))
        }
    };
    storage.close().await?;
    printed
}

async fn cmd_schedule(cron_expr: Option<&str>, once: bool) -> Result<()> {
    let config = load_config()?;
    let expr = cron_expr.unwrap_or(&config.schedule.cron).to_string();
    let schedule =
        parse_cron(&expr).map_err(|e| eyre!("invalid cron expression '{expr}': {e}"))?;

    let storage = open_store(&config).await?;
    let scheduler = build_scheduler(
        &config,
        &storage,
        config.schedule.concurrency as usize,
    )?;

    if once {
        let outcome = run_scheduled_batch(&scheduler, &config).await;
        storage.close().await?;
        return print_json(&outcome?);
    }

    info!(cron = %expr, "scheduler started");
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            info!("cron schedule has no further ticks");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "waiting for next tick");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping scheduler");
                break;
            }
        }

        // One tick is one batch; ticks never overlap.
        match run_scheduled_batch(&scheduler, &config).await {
            Ok(outcomes) => info!(succeeded = outcomes.len(), "scheduled batch finished"),
            Err(e) => error!(kind = e.kind(), error = %e, "scheduled batch failed"),
        }
    }

    storage.close().await?;
    Ok(())
}

async fn run_scheduled_batch(
    scheduler: &IngestionScheduler,
    config: &AppConfig,
) -> ingestflow_shared::Result<Vec<JobOutcome>> {
    scheduler
        .run_batch(
            Utc::now().date_naive(),
            &config.schedule.timezone,
            config.schedule.limit,
        )
        .await
}

async fn cmd_tools() -> Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config)?;

    for descriptor in registry.list() {
        let marker = if config.pipeline.stages.contains(&descriptor.name) {
            "*"
        } else {
            " "
        };
        let disabled = if descriptor.enabled { "" } else { " (disabled)" };
        println!("{marker} {} v{}{disabled}", descriptor.name, descriptor.version);
        if !descriptor.description.is_empty() {
            println!("    {}", descriptor.description);
        }
        println!("    input:    {}", descriptor.input.describe());
        println!("    output:   {}", descriptor.output.describe());
        println!(
            "    defaults: {}",
            serde_json::Value::Object(descriptor.defaults.clone())
        );
    }
    Ok(())
}

async fn cmd_logs(job: Option<&str>, source: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = open_store_readonly(&config).await?;

    let events = match (job, source) {
        (Some(job), _) => storage.list_events(&parse_job_id(job)?).await?,
        (None, Some(source)) => storage.list_events_for_source(source).await?,
        (None, None) => return Err(eyre!("provide --job or --source")),
    };
    storage.close().await?;

    print_json(&events)
}

async fn cmd_result(job: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_store_readonly(&config).await?;

    let job_id = parse_job_id(job)?;
    let result = storage.get_result(&job_id).await?;
    storage.close().await?;

    match result {
        Some(result) => print_json(&result),
        None => Err(eyre!("no result persisted for job {job_id}")),
    }
}

async fn cmd_results(limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_store_readonly(&config).await?;

    let results = storage.list_results(limit).await;
    storage.close().await?;

    print_json(&results?)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Batch progress on an indicatif spinner.
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
        spinner.set_message("Fetching records");
        Self { spinner }
    }

    /// Clear the spinner once the run is over, successful or not.
    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl BatchReporter for CliProgress {
    fn fetched(&self, total: usize) {
        self.spinner.set_message(format!("Fetched {total} records"));
    }

    fn record_finished(&self, record_id: &str, succeeded: bool, current: usize, total: usize) {
        let status = if succeeded { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Processed [{current}/{total}] {record_id} {status}"));
    }

    // A range reports one summary per day, so the spinner keeps running.
    fn done(&self, report: &BatchReport) {
        self.spinner.println(format!(
            "  {} succeeded, {} failed in {:.1}s",
            report.succeeded,
            report.failed,
            report.elapsed.as_secs_f64()
        ));
        self.spinner.set_message("Fetching records");
    }
}
