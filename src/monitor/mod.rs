//! Host resource sampling.
//!
//! Admission control and health reporting both read CPU and memory pressure
//! through [`ResourceMonitor`], so either can run against a fixed reading in
//! tests instead of the live host.

mod system;

use std::sync::Mutex;

use thiserror::Error;

pub use system::SystemMonitor;

/// A single reading of process CPU and host memory pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    /// CPU utilisation of this process. May exceed 100 on multi-core hosts.
    pub cpu_usage_percent: f64,
    /// Share of host memory still available, 0 to 100.
    pub free_memory_percent: f64,
}

/// Errors that can occur while sampling resources.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Current process id unavailable: {0}")]
    PidUnavailable(String),

    #[error("Process {0} not found")]
    ProcessNotFound(String),

    #[error("Host reported zero total memory")]
    NoMemoryInfo,

    #[error("Resource read failed: {0}")]
    ReadFailed(String),
}

/// Source of resource readings.
pub trait ResourceMonitor: Send + Sync {
    /// Take a fresh reading.
    fn snapshot(&self) -> Result<ResourceSnapshot, MonitorError>;
}

/// Monitor that returns a preset reading, or a preset failure.
///
/// Used where the live host must not influence the outcome.
#[derive(Debug)]
pub struct StaticMonitor {
    reading: Mutex<Result<ResourceSnapshot, String>>,
}

impl StaticMonitor {
    pub fn new(cpu_usage_percent: f64, free_memory_percent: f64) -> Self {
        Self {
            reading: Mutex::new(Ok(ResourceSnapshot {
                cpu_usage_percent,
                free_memory_percent,
            })),
        }
    }

    /// A monitor whose every read fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            reading: Mutex::new(Err(reason.to_string())),
        }
    }

    /// Replace the reading returned by subsequent snapshots.
    pub fn set(&self, cpu_usage_percent: f64, free_memory_percent: f64) {
        if let Ok(mut guard) = self.reading.lock() {
            *guard = Ok(ResourceSnapshot {
                cpu_usage_percent,
                free_memory_percent,
            });
        }
    }

    /// Make subsequent snapshots fail.
    pub fn fail(&self, reason: &str) {
        if let Ok(mut guard) = self.reading.lock() {
            *guard = Err(reason.to_string());
        }
    }
}

impl ResourceMonitor for StaticMonitor {
    fn snapshot(&self) -> Result<ResourceSnapshot, MonitorError> {
        let guard = self
            .reading
            .lock()
            .map_err(|e| MonitorError::ReadFailed(e.to_string()))?;
        guard.clone().map_err(MonitorError::ReadFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_monitor_reading_can_change() {
        let monitor = StaticMonitor::new(10.0, 90.0);
        assert_eq!(monitor.snapshot().unwrap().cpu_usage_percent, 10.0);

        monitor.set(95.0, 5.0);
        let reading = monitor.snapshot().unwrap();
        assert_eq!(reading.cpu_usage_percent, 95.0);
        assert_eq!(reading.free_memory_percent, 5.0);
    }

    #[test]
    fn test_static_monitor_failure() {
        let monitor = StaticMonitor::failing("probe offline");
        let err = monitor.snapshot().unwrap_err();
        assert!(err.to_string().contains("probe offline"));
    }
}
