use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Job urgency. Lower numerals dispatch first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(SimError::InvalidJob(format!(
                "priority must be 1 (high), 2 (medium), or 3 (low), got {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", *self as u8, self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Completed and cancelled jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub material: String,
    /// Seconds of simulated work before time scaling.
    pub estimated_duration: f64,
    pub priority: Priority,
    /// Insertion sequence, assigned when the job enters a queue.
    pub sequence: Option<u64>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        material: impl Into<String>,
        estimated_duration: f64,
        priority: Priority,
    ) -> Self {
        Self::with_created_at(id, material, estimated_duration, priority, Utc::now())
    }

    /// Build a job whose creation time was recorded elsewhere (e.g. at intake).
    pub fn with_created_at(
        id: impl Into<String>,
        material: impl Into<String>,
        estimated_duration: f64,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            material: material.into(),
            estimated_duration,
            priority,
            sequence: None,
            status: JobStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Queued -> Running. Returns false and leaves the job untouched otherwise.
    pub fn mark_running(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        true
    }

    /// Running -> Completed.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(at);
        true
    }

    /// Queued -> Cancelled.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Cancelled;
        true
    }

    /// Seconds between creation and dispatch.
    pub fn wait_time(&self) -> Option<f64> {
        self.started_at
            .map(|started| seconds_between(self.created_at, started))
    }

    /// Seconds between dispatch and completion.
    pub fn run_time(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(seconds_between(started, completed)),
            _ => None,
        }
    }

    /// Wall-clock delay that stands in for this job's work.
    ///
    /// NaN and non-positive products are zero; products too large for a
    /// `Duration` saturate at `Duration::MAX`.
    pub fn simulated_delay(&self, time_scale: f64) -> Duration {
        let secs = self.estimated_duration * time_scale;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job({}, {}, {}s, priority={})",
            self.id, self.material, self.estimated_duration, self.priority
        )
    }
}

pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}
