//! `cadence`: runs registered ETL tasks once or keeps them on schedule.
//!
//! ```text
//! cadence                    # enter the scheduler loop
//! cadence --all -x PayrollExport   # run everything once except PayrollExport
//! cadence sales inventory    # run tasks whose class name starts with either prefix
//! cadence --history 20       # print recent execution records as JSON lines
//! ```

mod tasks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadence_core::cancel::CancellationToken;
use cadence_core::config::Settings;
use cadence_core::dispatch::{RunSummary, run_all, run_matching};
use cadence_core::etl::{Cancelled, EtlTask, TaskRunner};
use cadence_core::notify::{FailureNotifier, LogNotifier, SmtpNotifier};
use cadence_core::persistence::ExecutionStore;
use cadence_core::registry::is_excluded;
use cadence_core::schedule::Scheduler;
use cadence_core::sqlite::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Scheduled ETL task runner")]
struct Cli {
    /// Run once every task whose class name starts with one of these prefixes
    names: Vec<String>,

    /// Class names to skip
    #[arg(short = 'x', long, num_args = 1..)]
    exclude: Vec<String>,

    /// Run every registered task once and exit
    #[arg(short, long, conflicts_with = "names")]
    all: bool,

    /// Settings file (defaults to ./cadence.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execution history database, overriding the settings file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Print the most recent execution records as JSON lines and exit
    #[arg(long, value_name = "COUNT", conflicts_with_all = ["names", "all"])]
    history: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Schedule,
    RunAll,
    RunMatching(Vec<String>),
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.all {
            Mode::RunAll
        } else if self.names.is_empty() {
            Mode::Schedule
        } else {
            Mode::RunMatching(self.names.clone())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cadence=debug,cadence_core=debug"
    } else {
        "cadence=info,cadence_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(path) = &cli.database {
        settings.database.path = path.clone();
    }

    let store = Arc::new(SqliteStore::new(&settings.database.path));
    store.migrate_to_latest()?;

    if let Some(limit) = cli.history {
        return print_history(store.as_ref(), limit);
    }

    let tasks = tasks::registry(&settings)?.instantiate()?;
    if tasks.is_empty() {
        tracing::warn!("no tasks are registered");
    }

    let notifier: Arc<dyn FailureNotifier> = match settings.smtp() {
        Some(smtp) => Arc::new(SmtpNotifier::new(&smtp)?),
        None => {
            tracing::warn!("smtp is not configured; failures are reported to the log only");
            Arc::new(LogNotifier)
        }
    };

    let cancellation = CancellationToken::new();
    let runner = TaskRunner::new(store, notifier).with_cancellation(cancellation.clone());
    tokio::spawn(watch_interrupts(cancellation));

    tracing::info!("---- Starting ----");
    let mode = cli.mode();
    let exclude = cli.exclude;
    let poll_interval = settings.poll_interval();
    tokio::task::spawn_blocking(move || run(mode, runner, tasks, &exclude, poll_interval))
        .await?;
    Ok(())
}

/// First Ctrl-C asks running work to stop; a second one exits immediately.
async fn watch_interrupts(cancellation: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("could not listen for interrupts");
        return;
    }
    tracing::info!("interrupt received; stopping after the current task");
    cancellation.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("second interrupt; exiting now");
        std::process::exit(130);
    }
}

fn run(
    mode: Mode,
    runner: TaskRunner,
    mut tasks: Vec<Box<dyn EtlTask>>,
    exclude: &[String],
    poll_interval: Duration,
) {
    match mode {
        Mode::RunAll => report(run_all(&runner, &mut tasks, exclude)),
        Mode::RunMatching(names) => report(run_matching(&runner, &mut tasks, &names, exclude)),
        Mode::Schedule => {
            tasks.retain(|task| !is_excluded(task.class_name(), exclude));
            let mut scheduler = Scheduler::new(runner);
            scheduler.schedule_all(tasks);
            scheduler.run_until_cancelled(poll_interval);
        }
    }
}

fn report(result: Result<RunSummary, Cancelled>) {
    match result {
        Ok(summary) => tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            "run finished"
        ),
        Err(Cancelled) => tracing::info!("interrupted; remaining tasks skipped"),
    }
}

fn print_history(store: &dyn ExecutionStore, limit: usize) -> Result<()> {
    for record in store.list_recent_executions(limit)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
