use thiserror::Error;

use crate::scheduler::JobStatus;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is {status}, only queued jobs can be cancelled")]
    InvalidState { job_id: String, status: JobStatus },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job ID '{0}' already exists")]
    DuplicateJob(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
