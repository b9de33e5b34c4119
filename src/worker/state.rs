use std::time::Duration;

/// Occupancy and accumulators for one worker.
///
/// Only the owning worker's dispatch loop mutates this, while holding the
/// simulator's shared lock.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: usize,
    pub current_job: Option<String>,
    pub jobs_completed: u64,
    pub busy_time: Duration,
}

impl WorkerState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            current_job: None,
            jobs_completed: 0,
            busy_time: Duration::ZERO,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current_job.is_some()
    }

    /// Take ownership of a dispatched job
    pub fn begin(&mut self, job_id: &str) {
        self.current_job = Some(job_id.to_string());
        tracing::debug!(worker_id = self.id, job_id, "Worker busy");
    }

    fn holds(&self, job_id: &str) -> bool {
        self.current_job.as_deref() == Some(job_id)
    }

    /// Release `job_id` and fold its busy time into the accumulators.
    ///
    /// Returns false, changing nothing, if this worker does not hold `job_id`.
    pub fn finish(&mut self, job_id: &str, busy: Duration) -> bool {
        if !self.holds(job_id) {
            return false;
        }
        self.current_job = None;
        self.jobs_completed += 1;
        self.busy_time += busy;
        true
    }

    /// Release `job_id` without counting it.
    pub fn release(&mut self, job_id: &str) -> bool {
        if !self.holds(job_id) {
            return false;
        }
        self.current_job = None;
        tracing::debug!(worker_id = self.id, job_id, "Worker released job uncounted");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_is_idle() {
        let worker = WorkerState::new(3);
        assert_eq!(worker.id, 3);
        assert!(!worker.is_busy());
        assert_eq!(worker.jobs_completed, 0);
        assert_eq!(worker.busy_time, Duration::ZERO);
    }

    #[test]
    fn finish_accumulates_busy_time() {
        let mut worker = WorkerState::new(0);
        worker.begin("a");
        assert!(worker.is_busy());
        assert!(worker.finish("a", Duration::from_millis(30)));

        worker.begin("b");
        assert!(worker.finish("b", Duration::from_millis(20)));

        assert!(!worker.is_busy());
        assert_eq!(worker.jobs_completed, 2);
        assert_eq!(worker.busy_time, Duration::from_millis(50));
    }

    #[test]
    fn finish_while_idle_changes_nothing() {
        let mut worker = WorkerState::new(0);
        assert!(!worker.finish("a", Duration::from_secs(1)));
        assert_eq!(worker.jobs_completed, 0);
        assert_eq!(worker.busy_time, Duration::ZERO);
    }

    #[test]
    fn finish_ignores_a_job_held_by_someone_else() {
        let mut worker = WorkerState::new(0);
        worker.begin("new");

        assert!(!worker.finish("old", Duration::from_secs(1)));
        assert!(!worker.release("old"));
        assert_eq!(worker.current_job.as_deref(), Some("new"));
        assert_eq!(worker.jobs_completed, 0);
    }

    #[test]
    fn release_frees_the_slot_without_counting() {
        let mut worker = WorkerState::new(0);
        worker.begin("a");

        assert!(worker.release("a"));
        assert!(!worker.is_busy());
        assert_eq!(worker.jobs_completed, 0);
        assert_eq!(worker.busy_time, Duration::ZERO);
    }
}
