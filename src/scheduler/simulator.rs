use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::intake::JobBatch;
use crate::scheduler::job::{seconds_between, Job, JobStatus};
use crate::scheduler::queue::JobQueue;
use crate::scheduler::report::{ReportConfig, SimulationReport};
use crate::worker::{JobExecutor, WorkerState};

/// Everything the workers and the orchestrator share. One lock guards it all.
#[derive(Debug)]
struct SimState {
    queue: JobQueue,
    workers: Vec<WorkerState>,
    completed: Vec<String>,
    cancelled: Vec<String>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    /// Summed span of every run before the current one
    earlier_runs_secs: f64,
}

impl SimState {
    fn new(worker_count: usize) -> Self {
        Self {
            queue: JobQueue::new(),
            workers: (0..worker_count).map(WorkerState::new).collect(),
            completed: Vec::new(),
            cancelled: Vec::new(),
            started_at: None,
            stopped_at: None,
            earlier_runs_secs: 0.0,
        }
    }

    /// Fold the previous run's span into the total and open a new run.
    fn begin_run(&mut self, now: DateTime<Utc>) {
        self.earlier_runs_secs += self.current_run_secs(now);
        self.started_at = Some(now);
        self.stopped_at = None;
    }

    fn current_run_secs(&self, now: DateTime<Utc>) -> f64 {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) if stop >= start => seconds_between(start, stop),
            (Some(start), None) if now >= start => seconds_between(start, now),
            _ => 0.0,
        }
    }

    /// Every submitted job is terminal and nothing is left to dispatch.
    fn is_converged(&self) -> bool {
        self.completed.len() + self.cancelled.len() >= self.queue.total_jobs()
            && self.queue.is_empty()
    }

    /// Time spent running, summed over every start/stop pair. The open run
    /// counts up to now.
    fn duration_secs(&self) -> f64 {
        self.earlier_runs_secs + self.current_run_secs(Utc::now())
    }
}

/// Point-in-time job and worker counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub total_jobs: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub queue_size: usize,
    pub active_workers: usize,
}

/// How a `run_until_complete` call ended.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All jobs reached a terminal status.
    Converged,
    /// The timeout elapsed first; unfinished jobs keep their status.
    TimedOut,
    /// The shutdown token fired first.
    Interrupted,
}

struct WorkerPool {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Print farm simulator: a priority queue drained by a fixed worker pool.
///
/// Lifecycle is idle -> running -> idle. All shared state lives behind a
/// single `RwLock`; worker tasks get `Arc` clones of it.
pub struct Simulator {
    config: SimulatorConfig,
    state: Arc<RwLock<SimState>>,
    executor: JobExecutor,
    /// Wakes idle workers when a job is submitted
    work_available: Arc<Notify>,
    /// Wakes the convergence loop when a job completes or is cancelled
    job_finished: Arc<Notify>,
    pool: Mutex<Option<WorkerPool>>,
    /// Workers that missed the grace period, by slot. Always locked after `pool`.
    detached: Mutex<HashMap<usize, JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            worker_count = config.worker_count,
            time_scale = config.time_scale,
            "Simulator created"
        );
        Ok(Self {
            state: Arc::new(RwLock::new(SimState::new(config.worker_count))),
            executor: JobExecutor::new(config.time_scale),
            work_available: Arc::new(Notify::new()),
            job_finished: Arc::new(Notify::new()),
            pool: Mutex::new(None),
            detached: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Register a job and enqueue it. Duplicate IDs must be filtered by the caller.
    pub async fn submit(&self, job: Job) {
        let job_id = job.id.clone();
        let priority = job.priority;
        let sequence = self.state.write().await.queue.push(job);
        tracing::info!(job_id = %job_id, priority = %priority, sequence, "Job submitted");
        self.work_available.notify_waiters();
    }

    /// Submit every job of a validated batch, in batch order.
    pub async fn submit_batch(&self, batch: JobBatch) {
        for job in batch.into_jobs() {
            self.submit(job).await;
        }
    }

    /// Cancel a job if it is still queued when the lock is taken.
    pub async fn cancel(&self, job_id: &str) -> bool {
        self.try_cancel(job_id).await.is_ok()
    }

    /// Like [`cancel`](Self::cancel), but reports why cancellation failed.
    pub async fn try_cancel(&self, job_id: &str) -> Result<()> {
        let result = {
            let mut state = self.state.write().await;
            let result = state.queue.try_cancel(job_id);
            if result.is_ok() {
                state.cancelled.push(job_id.to_string());
            }
            result
        };

        match &result {
            Ok(()) => {
                tracing::info!(job_id, "Job cancelled");
                self.job_finished.notify_one();
            }
            Err(e) => tracing::info!(job_id, error = %e, "Job not cancelled"),
        }
        result
    }

    /// Snapshot of a single job.
    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.state.read().await.queue.get_job(job_id).cloned()
    }

    /// Queued jobs in the order workers will pick them up.
    pub async fn pending_jobs(&self) -> Vec<Job> {
        self.state
            .read()
            .await
            .queue
            .pending_jobs()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn is_running(&self) -> bool {
        self.pool
            .lock()
            .await
            .as_ref()
            .is_some_and(|pool| !pool.token.is_cancelled())
    }

    /// Spawn one dispatch loop per worker. No-op if already running.
    ///
    /// A slot whose previous worker was detached by `stop` gets a new worker
    /// that waits for the old one to exit before it dispatches.
    pub async fn start(&self) {
        let mut pool = self.pool.lock().await;
        if let Some(existing) = pool.take() {
            if !existing.token.is_cancelled() {
                tracing::warn!("Simulation already running");
                *pool = Some(existing);
                return;
            }
            // A previous run was abandoned without stop; reap it first.
            self.join_workers(existing).await;
        }

        self.state.write().await.begin_run(Utc::now());

        let mut detached = self.detached.lock().await;
        let token = CancellationToken::new();
        let handles = (0..self.config.worker_count)
            .map(|worker_id| {
                let predecessor = detached.remove(&worker_id);
                let state = self.state.clone();
                let executor = self.executor.clone();
                let token = token.clone();
                let work_available = self.work_available.clone();
                let job_finished = self.job_finished.clone();
                let poll_interval = self.config.poll_interval();
                tokio::spawn(async move {
                    Self::worker_loop(
                        worker_id,
                        predecessor,
                        state,
                        executor,
                        token,
                        work_available,
                        job_finished,
                        poll_interval,
                    )
                    .await;
                })
            })
            .collect();

        *pool = Some(WorkerPool { token, handles });
        tracing::info!(
            worker_count = self.config.worker_count,
            "Simulation started"
        );
    }

    /// Signal every worker to exit at its next poll boundary and wait for it.
    ///
    /// Each worker gets `shutdown_grace` to finish its in-flight job; one that
    /// misses it is logged and left to exit on its own, still holding its
    /// slot. Idempotent.
    pub async fn stop(&self) {
        let mut pool = self.pool.lock().await;
        let Some(existing) = pool.take() else {
            tracing::info!("No simulation running");
            return;
        };

        tracing::info!("Stopping simulation");
        self.join_workers(existing).await;
        self.state.write().await.stopped_at = Some(Utc::now());
        tracing::info!("Simulation stopped");
    }

    async fn join_workers(&self, pool: WorkerPool) {
        pool.token.cancel();
        let grace = self.config.shutdown_grace();
        let mut detached = self.detached.lock().await;
        for (worker_id, mut handle) in pool.handles.into_iter().enumerate() {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(worker_id, error = %e, "Worker task failed"),
                Err(_) => {
                    tracing::warn!(
                        worker_id,
                        grace_ms = self.config.shutdown_grace_ms,
                        "Worker did not stop within grace period, detaching"
                    );
                    detached.insert(worker_id, handle);
                }
            }
        }
    }

    /// Run until every job is terminal or `timeout` elapses. Always stops the
    /// pool before returning.
    pub async fn run_until_complete(&self, timeout: Option<std::time::Duration>) -> RunOutcome {
        self.run_until_complete_with_shutdown(timeout, CancellationToken::new())
            .await
    }

    /// Like [`run_until_complete`](Self::run_until_complete), but also returns
    /// early when `shutdown` is cancelled.
    ///
    /// If this future is dropped mid-wait, the worker pool is still told to
    /// exit at its next poll boundary.
    pub async fn run_until_complete_with_shutdown(
        &self,
        timeout: Option<std::time::Duration>,
        shutdown: CancellationToken,
    ) -> RunOutcome {
        self.start().await;

        let _stop_on_drop = self
            .pool
            .lock()
            .await
            .as_ref()
            .map(|pool| pool.token.clone().drop_guard());

        let deadline = timeout.map(|t| Instant::now() + t);
        let poll_interval = self.config.poll_interval();

        let outcome = loop {
            if self.state.read().await.is_converged() {
                tracing::info!("All jobs finished");
                break RunOutcome::Converged;
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(
                            timeout_ms = ?timeout.map(|t| t.as_millis()),
                            "Timeout reached"
                        );
                        break RunOutcome::TimedOut;
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Simulation interrupted");
                    break RunOutcome::Interrupted;
                }
                _ = self.job_finished.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        };

        self.stop().await;
        outcome
    }

    /// Counts by status, taken under one lock so no job is counted twice.
    pub async fn status(&self) -> SimulationStatus {
        let state = self.state.read().await;
        SimulationStatus {
            total_jobs: state.queue.total_jobs(),
            queued: state.queue.count_by_status(JobStatus::Queued),
            running: state.queue.count_by_status(JobStatus::Running),
            completed: state.completed.len(),
            cancelled: state.cancelled.len(),
            queue_size: state.queue.len(),
            active_workers: state.workers.iter().filter(|w| w.is_busy()).count(),
        }
    }

    pub async fn report(&self) -> SimulationReport {
        let state = self.state.read().await;
        SimulationReport::build(
            &state.queue.all_jobs(),
            &state.workers,
            state.duration_secs(),
            ReportConfig {
                worker_count: self.config.worker_count,
                time_scale: self.config.time_scale,
            },
        )
    }

    /// Dispatch loop for one worker.
    ///
    /// 1. Pops the front job; the pop marks it running under the lock
    /// 2. Sleeps for the job's scaled duration (never interrupted)
    /// 3. Marks it completed and updates this worker's accumulators
    /// 4. Wakes the convergence loop
    ///
    /// When the queue is empty the worker waits for a submission or one poll
    /// interval. The token is checked between jobs and while idle.
    ///
    /// `predecessor` is a detached worker from an earlier run that still owns
    /// this slot; it is awaited before the first dispatch.
    #[allow(clippy::too_many_arguments)]
    async fn worker_loop(
        worker_id: usize,
        predecessor: Option<JoinHandle<()>>,
        state: Arc<RwLock<SimState>>,
        executor: JobExecutor,
        token: CancellationToken,
        work_available: Arc<Notify>,
        job_finished: Arc<Notify>,
        poll_interval: std::time::Duration,
    ) {
        if let Some(previous) = predecessor {
            tracing::info!(worker_id, "Waiting for detached worker to exit");
            if let Err(e) = previous.await {
                tracing::error!(worker_id, error = %e, "Detached worker failed");
            }
        }
        tracing::info!(worker_id, "Worker started");

        while !token.is_cancelled() {
            let next = {
                let mut state = state.write().await;
                let next = state.queue.pop_next(Utc::now());
                if let (Some(job), Some(worker)) = (&next, state.workers.get_mut(worker_id)) {
                    worker.begin(&job.id);
                }
                next
            };

            let Some(job) = next else {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = work_available.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                continue;
            };

            let result = executor.execute(worker_id, &job).await;

            {
                let completed_at = Utc::now();
                let mut state = state.write().await;
                if state.queue.complete(&result.job_id, completed_at) {
                    let busy = job
                        .started_at
                        .and_then(|started| (completed_at - started).to_std().ok())
                        .unwrap_or(result.elapsed);
                    if let Some(worker) = state.workers.get_mut(worker_id) {
                        worker.finish(&result.job_id, busy);
                    }
                    state.completed.push(result.job_id.clone());
                } else {
                    tracing::warn!(
                        worker_id,
                        job_id = %result.job_id,
                        "Job was not running at completion"
                    );
                    if let Some(worker) = state.workers.get_mut(worker_id) {
                        worker.release(&result.job_id);
                    }
                }
            }
            job_finished.notify_one();
        }

        tracing::info!(worker_id, "Worker stopped");
    }
}
