pub mod job;
pub mod queue;
pub mod report;
pub mod simulator;

pub use job::{Job, JobStatus, Priority};
pub use queue::JobQueue;
pub use report::{JobRecord, ReportConfig, SimulationMetrics, SimulationReport, WorkerUtilization};
pub use simulator::{RunOutcome, SimulationStatus, Simulator};
