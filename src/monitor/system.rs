//! Live resource monitor backed by `sysinfo`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use super::{MonitorError, ResourceMonitor, ResourceSnapshot};

struct Sampler {
    system: System,
    /// Last reading and when it was taken.
    last: Option<(Instant, ResourceSnapshot)>,
}

/// Samples this process's CPU usage and the host's available memory.
///
/// Process CPU is a tick delta between two refreshes, and a delta shorter
/// than `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` reads as near zero. Readings
/// are therefore reused until `refresh_interval` has passed.
pub struct SystemMonitor {
    sampler: Mutex<Sampler>,
    pid: Pid,
    refresh_interval: Duration,
}

impl SystemMonitor {
    pub fn new() -> Result<Self, MonitorError> {
        Self::with_refresh_interval(MINIMUM_CPU_UPDATE_INTERVAL)
    }

    /// Create a monitor that refreshes at most once per `refresh_interval`.
    /// Intervals below the sysinfo minimum are raised to it.
    pub fn with_refresh_interval(refresh_interval: Duration) -> Result<Self, MonitorError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| MonitorError::PidUnavailable(e.to_string()))?;

        let mut system = System::new();
        system.refresh_memory();
        system.refresh_process(pid);

        Ok(Self {
            sampler: Mutex::new(Sampler { system, last: None }),
            pid,
            refresh_interval: refresh_interval.max(MINIMUM_CPU_UPDATE_INTERVAL),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn sample(&self, system: &mut System) -> Result<ResourceSnapshot, MonitorError> {
        system.refresh_memory();
        if !system.refresh_process(self.pid) {
            return Err(MonitorError::ProcessNotFound(self.pid.to_string()));
        }

        let cpu_usage_percent = system
            .process(self.pid)
            .map(|p| f64::from(p.cpu_usage()))
            .ok_or_else(|| MonitorError::ProcessNotFound(self.pid.to_string()))?;

        let total = system.total_memory();
        if total == 0 {
            return Err(MonitorError::NoMemoryInfo);
        }
        let free_memory_percent = system.available_memory() as f64 / total as f64 * 100.0;

        debug!(
            cpu = cpu_usage_percent,
            free_memory = free_memory_percent,
            "Sampled resources"
        );

        Ok(ResourceSnapshot {
            cpu_usage_percent,
            free_memory_percent,
        })
    }
}

impl ResourceMonitor for SystemMonitor {
    fn snapshot(&self) -> Result<ResourceSnapshot, MonitorError> {
        let mut sampler = self
            .sampler
            .lock()
            .map_err(|e| MonitorError::ReadFailed(e.to_string()))?;

        let now = Instant::now();
        if let Some((taken_at, reading)) = sampler.last {
            if now.duration_since(taken_at) < self.refresh_interval {
                return Ok(reading);
            }
        }

        let reading = self.sample(&mut sampler.system)?;
        sampler.last = Some((now, reading));
        Ok(reading)
    }
}
