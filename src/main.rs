use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use printfarm::config::SimulatorConfig;
use printfarm::intake::JobBatch;
use printfarm::scheduler::{RunOutcome, SimulationReport, SimulationStatus, Simulator};
use printfarm::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "printfarm")]
#[command(version)]
#[command(about = "Print farm queue simulator")]
#[command(propagate_version = true)]
struct Args {
    /// Number of printers (workers)
    #[arg(long, short = 'w', default_value = "2", global = true)]
    workers: usize,

    /// Time scale factor applied to every job's estimated time
    #[arg(long, short = 't', default_value = "0.01", global = true)]
    time_scale: f64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a simulation over the jobs in a JSON file
    Run {
        /// JSON array of {id, material, est_time, priority}
        #[arg(long, short = 'j')]
        jobs: PathBuf,

        /// Give up after this many seconds; unfinished jobs stay queued or running
        #[arg(long)]
        timeout: Option<f64>,

        /// Cancel these job IDs before the run starts
        #[arg(long = "cancel", value_name = "JOB_ID")]
        cancel: Vec<String>,

        /// Write the full JSON report to this file
        #[arg(long, short = 'r')]
        report: Option<PathBuf>,
    },
    /// Validate a jobs file and list the queue in dispatch order
    Validate {
        #[arg(long, short = 'j')]
        jobs: PathBuf,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct RunOutput<'a> {
    outcome: &'static str,
    status: SimulationStatus,
    report: &'a SimulationReport,
}

#[derive(Serialize)]
struct QueueItem {
    position: usize,
    id: String,
    material: String,
    est_time: f64,
    priority: u8,
}

#[derive(Serialize)]
struct ValidateOutput {
    queue: Vec<QueueItem>,
    rejected: Vec<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn outcome_to_str(outcome: RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Converged => "converged",
        RunOutcome::TimedOut => "timed_out",
        RunOutcome::Interrupted => "interrupted",
    }
}

fn parse_timeout(timeout: Option<f64>) -> Result<Option<Duration>, Box<dyn std::error::Error>> {
    match timeout {
        Some(secs) => Ok(Some(Duration::try_from_secs_f64(secs).map_err(|e| {
            format!("invalid timeout {}: {}", secs, e)
        })?)),
        None => Ok(None),
    }
}

fn load_batch(path: &Path) -> Result<JobBatch, Box<dyn std::error::Error>> {
    let batch = JobBatch::load(path)?;
    for rejected in batch.rejected() {
        eprintln!("Skipped: {}", rejected);
    }
    Ok(batch)
}

fn print_report_table(outcome: RunOutcome, status: &SimulationStatus, report: &SimulationReport) {
    println!("Simulation {}", outcome_to_str(outcome));
    println!(
        "  Workers: {}, time scale: {}",
        report.config.worker_count, report.config.time_scale
    );
    println!("  Completed: {}", status.completed);
    println!("  Cancelled: {}", status.cancelled);
    if status.queued > 0 || status.running > 0 {
        println!("  Unfinished: {} queued, {} running", status.queued, status.running);
    }

    println!("\nJobs:");
    for job in &report.jobs {
        let wait = job
            .wait_time
            .map(|w| format!("{:.3}s", w))
            .unwrap_or_else(|| "-".to_string());
        let run = job
            .run_time
            .map(|r| format!("{:.3}s", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<10} P{} {:<10} wait {:<9} run {}",
            job.id,
            job.material,
            u8::from(job.priority),
            job.status.to_string(),
            wait,
            run
        );
    }

    let m = &report.metrics;
    if m.completed_jobs > 0 {
        println!("\nMetrics Summary:");
        println!(
            "  Total simulation time: {:.2}s",
            m.simulation_duration_seconds
        );
        if let Some(avg) = m.avg_wait_time {
            println!("  Average wait time: {:.3}s", avg);
        }
        if let Some(median) = m.median_wait_time {
            println!("  Median wait time: {:.3}s", median);
        }
        if let Some(avg) = m.avg_run_time {
            println!("  Average run time: {:.3}s", avg);
        }
        if let Some(throughput) = m.throughput_jobs_per_second {
            println!("  Throughput: {:.2} jobs/sec", throughput);
        }
        println!(
            "  Average printer utilization: {:.1}%",
            m.average_worker_utilization
        );
        for w in &m.worker_utilization {
            println!(
                "    Printer-{}: {} jobs, {:.1}%",
                w.worker_id, w.jobs_completed, w.utilization_percentage
            );
        }
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_run(
    config: SimulatorConfig,
    jobs: PathBuf,
    timeout: Option<f64>,
    cancel: Vec<String>,
    report_path: Option<PathBuf>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = parse_timeout(timeout)?;
    let batch = load_batch(&jobs)?;
    if batch.is_empty() {
        println!("No jobs to process");
        return Ok(());
    }

    let simulator = Simulator::new(config)?;
    simulator.submit_batch(batch).await;

    for job_id in &cancel {
        if let Err(e) = simulator.try_cancel(job_id).await {
            eprintln!("Could not cancel '{}': {}", job_id, e);
        }
    }

    let shutdown = install_shutdown_handler();
    let outcome = simulator
        .run_until_complete_with_shutdown(timeout, shutdown)
        .await;

    let status = simulator.status().await;
    let report = simulator.report().await;

    match output_format {
        OutputFormat::Json => {
            let output = RunOutput {
                outcome: outcome_to_str(outcome),
                status,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => print_report_table(outcome, &status, &report),
    }

    if let Some(path) = report_path {
        report.write_json(&path)?;
        if matches!(output_format, OutputFormat::Table) {
            println!("\nReport saved to {}", path.display());
        }
    }

    Ok(())
}

async fn handle_validate(
    config: SimulatorConfig,
    jobs: PathBuf,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch = load_batch(&jobs)?;
    let rejected: Vec<String> = batch.rejected().iter().map(|e| e.to_string()).collect();

    // Dispatch order comes from the queue itself.
    let simulator = Simulator::new(config)?;
    simulator.submit_batch(batch).await;
    let queue: Vec<QueueItem> = simulator
        .pending_jobs()
        .await
        .into_iter()
        .enumerate()
        .map(|(i, job)| QueueItem {
            position: i + 1,
            id: job.id,
            material: job.material,
            est_time: job.estimated_duration,
            priority: job.priority.into(),
        })
        .collect();

    match output_format {
        OutputFormat::Json => {
            let output = ValidateOutput { queue, rejected };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            let status = simulator.status().await;
            println!("Queue Status:");
            println!("  Total jobs: {}", status.total_jobs);
            println!("  Queued: {}", status.queue_size);
            println!("  Rejected: {}", rejected.len());
            if !queue.is_empty() {
                println!("\nQueued Jobs:");
                for item in &queue {
                    println!(
                        "  {}. {} - {} - {}s - Priority: {}",
                        item.position, item.id, item.material, item.est_time, item.priority
                    );
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = SimulatorConfig::new(args.workers, args.time_scale);
    config.validate()?;

    match args.command {
        Commands::Run {
            jobs,
            timeout,
            cancel,
            report,
        } => handle_run(config, jobs, timeout, cancel, report, &args.output).await,
        Commands::Validate { jobs } => handle_validate(config, jobs, &args.output).await,
    }
}
