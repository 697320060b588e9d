use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use prio_sched::config::SchedulerConfig;
use prio_sched::error::SchedulerError;
use prio_sched::scheduler::{sleep_action, JobRequest, JobSummary, Scheduler};
use prio_sched::worker::WorkerStatus;

#[derive(Parser, Debug)]
#[command(name = "prio-sched")]
#[command(version)]
#[command(about = "Run prioritized jobs on a fixed pool of workers")]
struct Args {
    /// Number of workers in the pool
    #[arg(long, short = 'w', default_value = "5")]
    workers: usize,

    /// Dispatcher polling interval in milliseconds
    #[arg(long, default_value = "10")]
    dispatch_interval_ms: u64,

    /// Maximum number of queued jobs
    #[arg(long, default_value = "10000")]
    max_queued_jobs: usize,

    /// Jobs to run, as "name:priority:seconds" (repeatable).
    /// Example: --job backup:50:3 --job report:10:1
    #[arg(long = "job", short = 'j')]
    jobs: Vec<String>,

    /// How often to print worker and queue status, in milliseconds
    #[arg(long, default_value = "1000")]
    report_interval_ms: u64,

    /// Stop waiting for jobs after this many seconds and shut down,
    /// cancelling whatever is still running
    #[arg(long)]
    max_runtime_secs: Option<u64>,

    /// How long shutdown may wait for running jobs, in milliseconds
    #[arg(long, default_value = "5000")]
    shutdown_deadline_ms: u64,

    /// Output format for status reports
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct StatusOutput {
    workers: Vec<WorkerStatus>,
    queued: Vec<JobSummary>,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse "name:priority:seconds". The name may itself contain ':'.
fn parse_job_spec(spec: &str) -> Result<JobRequest, String> {
    let mut parts = spec.trim().rsplitn(3, ':');
    let (Some(secs), Some(priority), Some(name)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!(
            "invalid job '{}', expected name:priority:seconds",
            spec
        ));
    };

    let priority: i64 = priority
        .parse()
        .map_err(|_| format!("invalid priority '{}' in job '{}'", priority, spec))?;
    let duration_secs: i64 = secs
        .parse()
        .map_err(|_| format!("invalid duration '{}' in job '{}'", secs, spec))?;

    Ok(JobRequest::new(name, priority, duration_secs))
}

async fn print_status(
    scheduler: &Scheduler,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let workers = scheduler.status().await;
    let queued = scheduler.queued_jobs().await;

    match output_format {
        OutputFormat::Json => {
            let output = StatusOutput { workers, queued };
            println!("{}", serde_json::to_string(&output)?);
        }
        OutputFormat::Table => {
            println!("{:<8} {:<6} {:<8} JOB", "WORKER", "BUSY", "JOB ID");
            println!("{}", "-".repeat(50));
            for worker in &workers {
                match &worker.current_job {
                    Some(job) => println!(
                        "{:<8} {:<6} {:<8} {} (priority {})",
                        worker.worker_id, "yes", job.id, job.name, job.priority
                    ),
                    None => println!("{:<8} {:<6} {:<8} -", worker.worker_id, "no", "-"),
                }
            }
            println!("Queued: {}", queued.len());
            for job in &queued {
                println!("  #{:<6} {:<20} priority {}", job.id, job.name, job.priority);
            }
            println!();
        }
    }
    Ok(())
}

/// Why the CLI stopped waiting for jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Drained,
    MaxRuntime,
    Signal,
}

/// Cancel the returned token on SIGINT or SIGTERM.
fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
            }
            token_clone.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, initiating graceful shutdown");
            token_clone.cancel();
        }
    });

    Ok(token)
}

/// Print status every `report_interval` until the scheduler drains,
/// `max_runtime` passes, or `stop` is cancelled.
async fn wait_for_jobs(
    scheduler: &Scheduler,
    output_format: &OutputFormat,
    report_interval: Duration,
    max_runtime: Option<Duration>,
    stop: &CancellationToken,
) -> Result<StopReason, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut report = tokio::time::interval(report_interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => return Ok(StopReason::Signal),

            _ = report.tick() => {}
        }
        print_status(scheduler, output_format).await?;

        if scheduler.is_drained().await {
            return Ok(StopReason::Drained);
        }
        if max_runtime.is_some_and(|limit| started.elapsed() >= limit) {
            return Ok(StopReason::MaxRuntime);
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SchedulerConfig::new(args.workers)
        .with_dispatch_interval_ms(args.dispatch_interval_ms)
        .with_max_queued_jobs(args.max_queued_jobs)
        .with_shutdown_deadline_ms(args.shutdown_deadline_ms);

    let scheduler = Scheduler::with_config(config)?;

    for spec in &args.jobs {
        let request = match parse_job_spec(spec) {
            Ok(request) => request,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                continue;
            }
        };
        let name = request.name.clone();
        match scheduler.submit_request(request, sleep_action()).await {
            Ok(id) => println!("Job '{}' scheduled with ID {}", name, id),
            Err(SchedulerError::Validation(e)) => eprintln!("Rejected job '{}': {}", name, e),
            Err(e) => return Err(e.into()),
        }
    }

    let stop = install_shutdown_handler()?;
    let reason = wait_for_jobs(
        &scheduler,
        &args.output,
        Duration::from_millis(args.report_interval_ms),
        args.max_runtime_secs.map(Duration::from_secs),
        &stop,
    )
    .await?;
    match reason {
        StopReason::Drained => tracing::info!("All jobs finished"),
        StopReason::MaxRuntime => {
            tracing::warn!("Maximum runtime reached, cancelling remaining jobs")
        }
        StopReason::Signal => tracing::warn!("Interrupted, cancelling remaining jobs"),
    }

    // Err(ShutdownTimeout) propagates as a non-zero exit code.
    scheduler
        .shutdown(scheduler.config().shutdown_deadline())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_job_spec_accepts_name_priority_seconds() {
        let req = parse_job_spec("backup:50:3").unwrap();
        assert_eq!(req, JobRequest::new("backup", 50, 3));
    }

    #[test]
    fn parse_job_spec_keeps_colons_in_name() {
        let req = parse_job_spec("db:main:10:2").unwrap();
        assert_eq!(req.name, "db:main");
        assert_eq!(req.priority, 10);
        assert_eq!(req.duration_secs, 2);
    }

    #[test]
    fn parse_job_spec_rejects_malformed_input() {
        assert!(parse_job_spec("backup").is_err());
        assert!(parse_job_spec("backup:high:3").is_err());
        assert!(parse_job_spec("backup:5:soon").is_err());
    }

    fn quiet_scheduler() -> Scheduler {
        Scheduler::with_config(SchedulerConfig::new(1).with_dispatch_interval_ms(5)).unwrap()
    }

    #[tokio::test]
    async fn wait_for_jobs_returns_when_drained() {
        let scheduler = quiet_scheduler();
        scheduler
            .submit_request(JobRequest::new("short", 10, 1), sleep_action())
            .await
            .unwrap();

        let reason = wait_for_jobs(
            &scheduler,
            &OutputFormat::Json,
            Duration::from_millis(50),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::Drained);
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_jobs_stops_on_signal_token() {
        let scheduler = quiet_scheduler();
        scheduler
            .submit_request(JobRequest::new("long", 10, 60), sleep_action())
            .await
            .unwrap();

        let stop = CancellationToken::new();
        let stop_clone = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop_clone.cancel();
        });

        let reason = tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_jobs(
                &scheduler,
                &OutputFormat::Table,
                Duration::from_millis(10),
                None,
                &stop,
            ),
        )
        .await
        .expect("signal should end the wait")
        .unwrap();
        assert_eq!(reason, StopReason::Signal);
        assert!(!scheduler.is_drained().await);

        // the running sleep honors cancellation
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_jobs_gives_up_after_max_runtime() {
        let scheduler = quiet_scheduler();
        scheduler
            .submit_request(JobRequest::new("long", 10, 60), sleep_action())
            .await
            .unwrap();

        let reason = wait_for_jobs(
            &scheduler,
            &OutputFormat::Json,
            Duration::from_millis(10),
            Some(Duration::from_millis(40)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::MaxRuntime);
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[test]
    fn parse_job_spec_leaves_range_checks_to_validation() {
        // out-of-range values parse; the scheduler rejects them
        let req = parse_job_spec("x:0:-1").unwrap();
        assert_eq!(req.priority, 0);
        assert_eq!(req.duration_secs, -1);
    }
}
