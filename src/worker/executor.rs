use std::time::{Duration, Instant};

use crate::scheduler::Job;

/// Result of a simulated job run
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: String,
    /// Delay requested for the job (estimated duration x time scale)
    pub simulated: Duration,
    /// Wall-clock time actually spent
    pub elapsed: Duration,
}

/// Performs a job's work as a pure delay.
///
/// The delay is `estimated_duration * time_scale` seconds. Nothing is
/// computed; the sleep is the simulation's load. Once started, a run cannot
/// be interrupted.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    time_scale: f64,
}

impl JobExecutor {
    pub fn new(time_scale: f64) -> Self {
        Self { time_scale }
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub async fn execute(&self, worker_id: usize, job: &Job) -> ExecutionResult {
        let simulated = job.simulated_delay(self.time_scale);
        tracing::info!(
            worker_id,
            job_id = %job.id,
            material = %job.material,
            scaled_secs = simulated.as_secs_f64(),
            "Processing job"
        );

        let started = Instant::now();
        tokio::time::sleep(simulated).await;
        let elapsed = started.elapsed();

        tracing::info!(
            worker_id,
            job_id = %job.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job completed"
        );

        ExecutionResult {
            job_id: job.id.clone(),
            simulated,
            elapsed,
        }
    }
}
