//! Job intake: validation and loading of job definitions before they reach
//! the simulator.
//!
//! The simulator accepts whatever it is given. Positive durations, the
//! priority range and ID uniqueness are all enforced here.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::scheduler::{Job, Priority};

fn default_material() -> String {
    "PLA".to_string()
}

fn default_priority() -> u8 {
    Priority::Medium as u8
}

/// A job definition as written in a jobs file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    #[serde(default = "default_material")]
    pub material: String,
    /// Estimated print time in seconds
    pub est_time: f64,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

impl JobSpec {
    pub fn new(
        id: impl Into<String>,
        material: impl Into<String>,
        est_time: f64,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            material: material.into(),
            est_time,
            priority,
        }
    }

    /// Check the definition and return its priority.
    pub fn validate(&self) -> Result<Priority> {
        if self.id.trim().is_empty() {
            return Err(SimError::InvalidJob("job ID must not be empty".to_string()));
        }
        if !self.est_time.is_finite() || self.est_time <= 0.0 {
            return Err(SimError::InvalidJob(format!(
                "estimated time for '{}' must be positive, got {}",
                self.id, self.est_time
            )));
        }
        Priority::try_from(self.priority)
    }

    pub fn into_job(self) -> Result<Job> {
        let priority = self.validate()?;
        Ok(Job::with_created_at(
            self.id,
            self.material,
            self.est_time,
            priority,
            Utc::now(),
        ))
    }
}

/// An ordered set of validated jobs with unique IDs.
#[derive(Debug, Default)]
pub struct JobBatch {
    jobs: Vec<Job>,
    ids: HashSet<String>,
    rejected: Vec<SimError>,
}

impl JobBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a job definition.
    pub fn add(&mut self, spec: JobSpec) -> Result<()> {
        if self.ids.contains(&spec.id) {
            return Err(SimError::DuplicateJob(spec.id));
        }
        let job = spec.into_job()?;
        self.ids.insert(job.id.clone());
        self.jobs.push(job);
        Ok(())
    }

    /// Build a batch, keeping the definitions that validate.
    ///
    /// Entries that fail validation are kept in [`rejected`](Self::rejected)
    /// instead of failing the whole batch.
    pub fn from_specs(specs: impl IntoIterator<Item = JobSpec>) -> Self {
        let mut batch = Self::new();
        for spec in specs {
            let id = spec.id.clone();
            if let Err(e) = batch.add(spec) {
                tracing::warn!(job_id = %id, error = %e, "Job rejected");
                batch.rejected.push(e);
            }
        }
        batch
    }

    /// Parse a JSON array of job definitions.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let specs: Vec<JobSpec> = serde_json::from_str(json)?;
        Ok(Self::from_specs(specs))
    }

    /// Read a JSON array of job definitions from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let batch = Self::from_json_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            loaded = batch.len(),
            rejected = batch.rejected.len(),
            "Jobs loaded"
        );
        Ok(batch)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn rejected(&self) -> &[SimError] {
        &self.rejected
    }

    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
