//! End-of-run (or mid-run) reporting.
//!
//! A [`SimulationReport`] is a plain snapshot: per-job records plus aggregate
//! metrics. Wait and run statistics only consider completed jobs.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Wait time | started - created |
//! | Run time | completed - started |
//! | Median wait | element `len / 2` of the sorted waits |
//! | Throughput | completed jobs / simulation duration |
//! | Utilization | worker busy time / simulation duration x 100 |
//!
//! # Job ordering
//!
//! Started jobs come first, by start time; jobs that never started follow
//! in submission order.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::job::{Job, JobStatus, Priority};
use crate::worker::WorkerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub material: String,
    pub est_time: f64,
    pub priority: Priority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub wait_time: Option<f64>,
    pub run_time: Option<f64>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            material: job.material.clone(),
            est_time: job.estimated_duration,
            priority: job.priority,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            wait_time: job.wait_time(),
            run_time: job.run_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerUtilization {
    pub worker_id: usize,
    pub jobs_completed: u64,
    pub total_busy_time: f64,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub cancelled_jobs: usize,
    pub simulation_duration_seconds: f64,
    pub time_scale_factor: f64,
    pub avg_wait_time: Option<f64>,
    pub median_wait_time: Option<f64>,
    pub max_wait_time: Option<f64>,
    pub min_wait_time: Option<f64>,
    pub avg_run_time: Option<f64>,
    pub throughput_jobs_per_second: Option<f64>,
    pub average_worker_utilization: f64,
    pub worker_utilization: Vec<WorkerUtilization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub worker_count: usize,
    pub time_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub jobs: Vec<JobRecord>,
    pub metrics: SimulationMetrics,
    pub config: ReportConfig,
}

impl SimulationReport {
    /// Build a report from a registry snapshot.
    ///
    /// `duration_secs` is the simulation wall-clock span the utilization and
    /// throughput figures are measured against.
    pub fn build(
        jobs: &[&Job],
        workers: &[WorkerState],
        duration_secs: f64,
        config: ReportConfig,
    ) -> Self {
        let mut ordered: Vec<&Job> = jobs.to_vec();
        ordered.sort_by(|a, b| report_order(a, b));

        let completed: Vec<&Job> = jobs
            .iter()
            .copied()
            .filter(|j| j.status == JobStatus::Completed)
            .collect();
        let cancelled_jobs = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Cancelled)
            .count();

        let mut waits: Vec<f64> = completed.iter().filter_map(|j| j.wait_time()).collect();
        waits.sort_by(|a, b| a.total_cmp(b));
        let runs: Vec<f64> = completed.iter().filter_map(|j| j.run_time()).collect();

        let worker_utilization: Vec<WorkerUtilization> = workers
            .iter()
            .map(|w| {
                let busy = w.busy_time.as_secs_f64();
                WorkerUtilization {
                    worker_id: w.id,
                    jobs_completed: w.jobs_completed,
                    total_busy_time: busy,
                    utilization_percentage: if duration_secs > 0.0 {
                        busy / duration_secs * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        let average_worker_utilization = mean(
            &worker_utilization
                .iter()
                .map(|w| w.utilization_percentage)
                .collect::<Vec<_>>(),
        )
        .unwrap_or(0.0);

        let metrics = SimulationMetrics {
            total_jobs: jobs.len(),
            completed_jobs: completed.len(),
            cancelled_jobs,
            simulation_duration_seconds: duration_secs,
            time_scale_factor: config.time_scale,
            avg_wait_time: mean(&waits),
            median_wait_time: waits.get(waits.len() / 2).copied(),
            max_wait_time: waits.last().copied(),
            min_wait_time: waits.first().copied(),
            avg_run_time: mean(&runs),
            throughput_jobs_per_second: if duration_secs > 0.0 {
                Some(completed.len() as f64 / duration_secs)
            } else {
                None
            },
            average_worker_utilization,
            worker_utilization,
        };

        Self {
            jobs: ordered.into_iter().map(JobRecord::from).collect(),
            metrics,
            config,
        }
    }

    /// Records for jobs with the given status, in report order.
    pub fn jobs_with_status(&self, status: JobStatus) -> impl Iterator<Item = &JobRecord> {
        self.jobs.iter().filter(move |j| j.status == status)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), "JSON report saved");
        Ok(())
    }
}

fn report_order(a: &Job, b: &Job) -> Ordering {
    match (a.started_at, b.started_at) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.sequence.cmp(&b.sequence)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.sequence.cmp(&b.sequence),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Completed job created at t0 that waited `wait_ms` and ran `run_ms`.
    fn completed_job(id: &str, sequence: u64, wait_ms: i64, run_ms: i64) -> Job {
        let t0 = base_time();
        let mut job = Job::with_created_at(id, "PLA", 1.0, Priority::Medium, t0);
        job.sequence = Some(sequence);
        let started = t0 + ChronoDuration::milliseconds(wait_ms);
        assert!(job.mark_running(started));
        assert!(job.mark_completed(started + ChronoDuration::milliseconds(run_ms)));
        job
    }

    fn queued_job(id: &str, sequence: u64) -> Job {
        let mut job = Job::with_created_at(id, "ABS", 1.0, Priority::Low, base_time());
        job.sequence = Some(sequence);
        job
    }

    fn config() -> ReportConfig {
        ReportConfig {
            worker_count: 1,
            time_scale: 0.01,
        }
    }

    #[test]
    fn wait_statistics_use_upper_median() {
        let jobs = [
            completed_job("a", 0, 400, 10),
            completed_job("b", 1, 100, 10),
            completed_job("c", 2, 300, 10),
            completed_job("d", 3, 200, 10),
        ];
        let refs: Vec<&Job> = jobs.iter().collect();
        let report = SimulationReport::build(&refs, &[], 1.0, config());
        let m = &report.metrics;

        assert_eq!(m.completed_jobs, 4);
        assert!((m.avg_wait_time.unwrap() - 0.25).abs() < 1e-9);
        assert!((m.median_wait_time.unwrap() - 0.3).abs() < 1e-9);
        assert!((m.max_wait_time.unwrap() - 0.4).abs() < 1e-9);
        assert!((m.min_wait_time.unwrap() - 0.1).abs() < 1e-9);
        assert!((m.avg_run_time.unwrap() - 0.01).abs() < 1e-9);
        assert!((m.throughput_jobs_per_second.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn unfinished_jobs_are_excluded_from_timing_metrics() {
        let mut cancelled = queued_job("cancelled", 1);
        assert!(cancelled.mark_cancelled());
        let jobs = [completed_job("done", 0, 50, 20), cancelled, queued_job("waiting", 2)];
        let refs: Vec<&Job> = jobs.iter().collect();
        let report = SimulationReport::build(&refs, &[], 2.0, config());

        assert_eq!(report.metrics.total_jobs, 3);
        assert_eq!(report.metrics.completed_jobs, 1);
        assert_eq!(report.metrics.cancelled_jobs, 1);
        assert!((report.metrics.avg_wait_time.unwrap() - 0.05).abs() < 1e-9);

        let cancelled = report.jobs.iter().find(|j| j.id == "cancelled").unwrap();
        assert!(cancelled.wait_time.is_none());
        assert!(cancelled.run_time.is_none());
    }

    #[test]
    fn no_completed_jobs_leaves_statistics_empty() {
        let jobs = [queued_job("a", 0)];
        let refs: Vec<&Job> = jobs.iter().collect();
        let report = SimulationReport::build(&refs, &[], 0.0, config());

        assert_eq!(report.metrics.completed_jobs, 0);
        assert!(report.metrics.avg_wait_time.is_none());
        assert!(report.metrics.median_wait_time.is_none());
        assert!(report.metrics.avg_run_time.is_none());
        assert!(report.metrics.throughput_jobs_per_second.is_none());
    }

    #[test]
    fn zero_duration_guards_utilization_and_throughput() {
        let jobs = [completed_job("a", 0, 0, 10)];
        let refs: Vec<&Job> = jobs.iter().collect();
        let mut worker = WorkerState::new(0);
        worker.begin("a");
        worker.finish("a", Duration::from_millis(10));

        let report = SimulationReport::build(&refs, &[worker], 0.0, config());

        assert!(report.metrics.throughput_jobs_per_second.is_none());
        assert_eq!(report.metrics.worker_utilization[0].utilization_percentage, 0.0);
        assert_eq!(report.metrics.worker_utilization[0].jobs_completed, 1);
        assert_eq!(report.metrics.average_worker_utilization, 0.0);
    }

    #[test]
    fn utilization_is_busy_share_of_duration() {
        let mut busy = WorkerState::new(0);
        busy.begin("a");
        busy.finish("a", Duration::from_millis(500));
        let idle = WorkerState::new(1);

        let report = SimulationReport::build(&[], &[busy, idle], 2.0, config());
        let util = &report.metrics.worker_utilization;

        assert!((util[0].utilization_percentage - 25.0).abs() < 1e-9);
        assert!((util[0].total_busy_time - 0.5).abs() < 1e-9);
        assert_eq!(util[1].utilization_percentage, 0.0);
        assert!((report.metrics.average_worker_utilization - 12.5).abs() < 1e-9);
    }

    #[test]
    fn started_jobs_precede_unstarted_jobs() {
        let jobs = [
            queued_job("never-started", 0),
            completed_job("late", 1, 300, 10),
            completed_job("early", 2, 100, 10),
            queued_job("also-waiting", 3),
        ];
        let refs: Vec<&Job> = jobs.iter().collect();
        let report = SimulationReport::build(&refs, &[], 1.0, config());

        let order: Vec<&str> = report.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(order, vec!["early", "late", "never-started", "also-waiting"]);
    }

    #[test]
    fn report_serializes_priority_as_number() {
        let jobs = [queued_job("a", 0)];
        let refs: Vec<&Job> = jobs.iter().collect();
        let report = SimulationReport::build(&refs, &[], 0.0, config());

        let json = report.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["jobs"][0]["priority"], 3);
        assert_eq!(value["jobs"][0]["status"], "queued");
        assert!(value["jobs"][0]["wait_time"].is_null());
        assert_eq!(value["config"]["worker_count"], 1);
    }
}
