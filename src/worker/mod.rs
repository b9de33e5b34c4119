//! Worker side of the simulation.
//!
//! - [`JobExecutor`]: performs a job's simulated work as a scaled delay
//! - [`WorkerState`]: per-worker occupancy and utilization accumulators
//!
//! The dispatch loop that ties these to the shared queue lives in
//! [`Simulator`](crate::scheduler::Simulator); one loop runs per worker.

pub mod executor;
pub mod state;

pub use executor::{ExecutionResult, JobExecutor};
pub use state::WorkerState;
