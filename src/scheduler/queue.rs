use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{Result, SimError};
use crate::scheduler::job::{Job, JobStatus, Priority};

/// Job registry plus the pending set, ordered by `(priority, sequence)`.
///
/// The registry keeps every job ever pushed, whatever its status. The pending
/// index only references queued jobs, and every removal from it changes the
/// job's status in the same call. Callers share one instance behind a lock;
/// none of the methods here block.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: HashMap<String, Job>,
    pending: BTreeMap<(Priority, u64), String>,
    next_sequence: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and enqueue it. Returns the assigned insertion sequence.
    pub fn push(&mut self, mut job: Job) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        job.sequence = Some(sequence);
        job.status = JobStatus::Queued;
        job.started_at = None;
        job.completed_at = None;

        let key = (job.priority, sequence);
        let id = job.id.clone();
        if let Some(previous) = self.jobs.insert(id.clone(), job) {
            // Duplicate IDs are rejected at intake; keep the index consistent anyway.
            tracing::warn!(job_id = %id, "Job ID re-submitted, replacing previous entry");
            if let (JobStatus::Queued, Some(old_sequence)) = (previous.status, previous.sequence) {
                self.pending.remove(&(previous.priority, old_sequence));
            }
        }
        self.pending.insert(key, id);
        sequence
    }

    /// Remove the front job and mark it running as of `started_at`.
    pub fn pop_next(&mut self, started_at: DateTime<Utc>) -> Option<Job> {
        while let Some((_, id)) = self.pending.pop_first() {
            if let Some(job) = self.jobs.get_mut(&id) {
                if job.mark_running(started_at) {
                    return Some(job.clone());
                }
            }
        }
        None
    }

    /// Cancel a job that is still queued.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.try_cancel(id).is_ok()
    }

    /// Cancel a job that is still queued, reporting why it could not be.
    pub fn try_cancel(&mut self, id: &str) -> Result<()> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| SimError::JobNotFound(id.to_string()))?;

        let sequence = match (job.status, job.sequence) {
            (JobStatus::Queued, Some(sequence)) => sequence,
            (status, _) => {
                return Err(SimError::InvalidState {
                    job_id: id.to_string(),
                    status,
                })
            }
        };

        self.pending.remove(&(job.priority, sequence));
        job.mark_cancelled();
        Ok(())
    }

    /// Mark a running job completed as of `completed_at`.
    pub fn complete(&mut self, id: &str, completed_at: DateTime<Utc>) -> bool {
        self.jobs
            .get_mut(id)
            .map(|job| job.mark_completed(completed_at))
            .unwrap_or(false)
    }

    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Queued jobs in dispatch order.
    pub fn pending_jobs(&self) -> Vec<&Job> {
        self.pending
            .values()
            .filter_map(|id| self.jobs.get(id))
            .collect()
    }

    /// Every registered job, in submission order.
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.sequence);
        jobs
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    /// Number of jobs ever registered.
    pub fn total_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Number of jobs waiting for dispatch.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
