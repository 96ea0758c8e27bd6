// Entry point for the RFI scan worker

mod config;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rfi_scanner::ai::{OpenAiClassifier, RateLimitedClassifier};
use rfi_scanner::{
    CategoryCatalog, FileJobStore, HttpMetadataService, JobPoller, JobRunner, JobStore,
    LocalObjectStore, PollerConfig, PostgresJobStore, ProcMemoryProbe, RunOutcome, RunnerConfig,
    ScanDeps, ScanJob, ScanWindow, SidecarTextExtractor, Subscriber, WebhookChannel,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "rfi-worker", about = "Scan an object store for requests for information")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a scan job
    Enqueue {
        /// Target category, e.g. "acoustic"
        #[arg(long)]
        category: String,

        /// Subscriber address (repeatable)
        #[arg(long = "subscriber", required = true)]
        subscribers: Vec<String>,

        /// Window start (RFC 3339); defaults to `--days` before the end
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339); defaults to now
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Claim and run one job
    Run { job_id: Uuid },

    /// Run claimable jobs until interrupted
    Poll,

    /// Show one job, or all jobs
    Status { job_id: Option<Uuid> },

    /// Queue a completed job again for the time since its last window
    Requeue {
        job_id: Uuid,

        /// Window length for a job that never completed a window
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// List the built-in categories
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rfi_scanner=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Command::Categories = cli.command {
        for category in CategoryCatalog::builtin().iter() {
            println!("{:<12} {}", category.name, category.label);
        }
        return Ok(());
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let jobs = open_job_store(&config).await?;

    match cli.command {
        Command::Enqueue {
            category,
            subscribers,
            start,
            end,
            days,
        } => {
            if CategoryCatalog::builtin().get(&category).is_none() {
                bail!("unknown category: {category}");
            }
            let window = window(start, end, days)?;
            let job = ScanJob::new(category, window)
                .with_subscribers(subscribers.into_iter().map(Subscriber::new));
            jobs.create(&job).await.context("Failed to create job")?;
            tracing::info!(job_id = %job.id, "job queued");
            println!("{}", job.id);
        }
        Command::Run { job_id } => {
            let runner = build_runner(&config, jobs)?;
            let outcome = runner.run(job_id).await.context("Job run failed")?;
            report(&outcome);
        }
        Command::Poll => {
            let runner = Arc::new(build_runner(&config, jobs)?);
            let poller = JobPoller::new(
                runner,
                PollerConfig {
                    idle_interval: config.poll_interval,
                    ..Default::default()
                },
            );

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested, finishing current run");
                    signal.cancel();
                }
            });

            poller.run(shutdown).await;
        }
        Command::Status { job_id } => {
            let listed = match job_id {
                Some(id) => vec![jobs.get(id).await.context("Failed to load job")?],
                None => jobs.list().await.context("Failed to list jobs")?,
            };
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Command::Requeue { job_id, days } => {
            let job = jobs.get(job_id).await.context("Failed to load job")?;
            let window = requeue_window(&job, Utc::now(), days)?;
            jobs.requeue(job_id, window)
                .await
                .context("Failed to requeue job")?;
            tracing::info!(%job_id, start = %window.start, end = %window.end, "job requeued");
        }
        Command::Categories => unreachable!(),
    }

    Ok(())
}

fn window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    days: i64,
) -> Result<ScanWindow> {
    let end = end.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(end - ChronoDuration::days(days));
    if start >= end {
        bail!("window start {start} must be before end {end}");
    }
    Ok(ScanWindow::new(start, end))
}

/// The next window for `job`: from where its last completed window ended
/// up to `now`, so consecutive scans never overlap.
fn requeue_window(job: &ScanJob, now: DateTime<Utc>, days: i64) -> Result<ScanWindow> {
    let start = job
        .last_completed_window_end
        .unwrap_or(now - ChronoDuration::days(days));
    if start >= now {
        bail!("job {} is already scanned up to {start}", job.id);
    }
    Ok(ScanWindow::new(start, now))
}

async fn open_job_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PostgresJobStore::new(url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");
            Ok(Arc::new(store))
        }
        None => {
            let store = FileJobStore::open(config.job_store_dir.clone())
                .await
                .with_context(|| {
                    format!("Failed to open job store at {}", config.job_store_dir.display())
                })?;
            tracing::info!(dir = %config.job_store_dir.display(), "using file job store");
            Ok(Arc::new(store))
        }
    }
}

fn build_runner(config: &Config, jobs: Arc<dyn JobStore>) -> Result<JobRunner> {
    let Some(api_key) = config.openai_api_key.clone() else {
        bail!("OPENAI_API_KEY must be set to run scans");
    };
    let mut classifier = OpenAiClassifier::new(api_key);
    if let Some(model) = &config.openai_model {
        classifier = classifier.with_model(model.clone());
    }
    let classifier = RateLimitedClassifier::new(classifier, config.classifier_rps);

    let objects = Arc::new(LocalObjectStore::new(config.object_store_root.clone()));
    let deps = ScanDeps {
        objects: objects.clone(),
        text: Arc::new(SidecarTextExtractor::new(objects)),
        classifier: Arc::new(classifier),
        jobs,
        metadata: Arc::new(HttpMetadataService::new(config.metadata_url.clone())),
        channel: Arc::new(WebhookChannel::new(config.webhook_url.clone())),
        memory: Arc::new(ProcMemoryProbe::new()),
    };

    let mut runner_config = match &config.worker_id {
        Some(id) => RunnerConfig::with_worker_id(id.clone()),
        None => RunnerConfig::default(),
    };
    if let Some(ceiling) = config.memory_ceiling_bytes {
        let fraction = runner_config.memory_fraction;
        runner_config = runner_config.with_memory_ceiling(ceiling, fraction);
    }

    Ok(JobRunner::new(deps, runner_config))
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NotClaimed => println!("job is not claimable"),
        RunOutcome::Completed(summary) => println!(
            "completed: {} processed, {} matches, {} notifications",
            summary.processed, summary.matches_found, summary.notifications_sent
        ),
        RunOutcome::Paused { reason, summary } => println!(
            "paused ({reason:?}) after {} documents; run again to resume",
            summary.processed
        ),
        RunOutcome::Failed { error, summary } => println!(
            "failed after {} documents: {error}; run again to resume",
            summary.processed
        ),
    }
}
