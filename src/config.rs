use std::time::Duration;

use crate::error::{Result, SimError};

/// Configuration for one simulator instance.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Number of concurrent workers (printers)
    pub worker_count: usize,
    /// Multiplier from a job's estimated seconds to wall-clock seconds
    pub time_scale: f64,
    /// Upper bound on how long an idle worker or the convergence loop sleeps
    pub poll_interval_ms: u64,
    /// How long `stop` waits for each worker before detaching it
    pub shutdown_grace_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            time_scale: 0.01,
            poll_interval_ms: 100,
            shutdown_grace_ms: 5000,
        }
    }
}

impl SimulatorConfig {
    pub fn new(worker_count: usize, time_scale: f64) -> Self {
        Self {
            worker_count,
            time_scale,
            ..Default::default()
        }
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, shutdown_grace_ms: u64) -> Self {
        self.shutdown_grace_ms = shutdown_grace_ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SimError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "time scale must be positive, got {}",
                self.time_scale
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(SimError::InvalidConfig(
                "poll interval must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_config_default() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.worker_count, 2);
        assert_eq!(cfg.time_scale, 0.01);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn simulator_config_new_keeps_default_timings() {
        let cfg = SimulatorConfig::new(4, 0.5);
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.time_scale, 0.5);
        assert_eq!(cfg.poll_interval_ms, 100);
        assert_eq!(cfg.shutdown_grace_ms, 5000);
    }

    #[test]
    fn simulator_config_builders() {
        let cfg = SimulatorConfig::default()
            .with_poll_interval_ms(10)
            .with_shutdown_grace_ms(250);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
        assert_eq!(cfg.shutdown_grace(), Duration::from_millis(250));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cfg = SimulatorConfig::new(0, 0.01);
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn non_positive_time_scale_is_rejected() {
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = SimulatorConfig::new(1, scale);
            assert!(cfg.validate().is_err(), "time scale {} should fail", scale);
        }
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cfg = SimulatorConfig::default().with_poll_interval_ms(0);
        assert!(cfg.validate().is_err());
    }
}
