//! Load-sensitive admission control.
//!
//! Requests are turned away before any work is queued when process CPU is
//! above its threshold or available memory is below its threshold. Readings
//! exactly at a threshold are admitted. A failed reading admits the request.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::monitor::{ResourceMonitor, ResourceSnapshot};

/// Plain-text body returned with a 429 when admission is refused.
pub const OVERLOAD_MESSAGE: &str = "System is under high load. Please try again later.";

/// Resource limits above/below which requests are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionThresholds {
    /// Reject when CPU usage is strictly above this percentage.
    pub max_cpu_percent: f64,
    /// Reject when available memory is strictly below this percentage.
    pub min_free_memory_percent: f64,
}

impl Default for AdmissionThresholds {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80.0,
            min_free_memory_percent: 20.0,
        }
    }
}

impl AdmissionThresholds {
    /// Whether a reading is within limits.
    pub fn permits(&self, reading: &ResourceSnapshot) -> bool {
        reading.cpu_usage_percent <= self.max_cpu_percent
            && reading.free_memory_percent >= self.min_free_memory_percent
    }
}

/// Decides whether to accept new work given current resource pressure.
pub struct AdmissionGate {
    monitor: Arc<dyn ResourceMonitor>,
    thresholds: AdmissionThresholds,
}

impl AdmissionGate {
    pub fn new(monitor: Arc<dyn ResourceMonitor>, thresholds: AdmissionThresholds) -> Self {
        Self {
            monitor,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> AdmissionThresholds {
        self.thresholds
    }

    pub fn should_admit(&self) -> bool {
        let reading = match self.monitor.snapshot() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Resource read failed, admitting request: {}", e);
                return true;
            }
        };

        let admit = self.thresholds.permits(&reading);
        if admit {
            debug!(
                cpu = reading.cpu_usage_percent,
                free_memory = reading.free_memory_percent,
                "Request admitted"
            );
        } else {
            warn!(
                cpu = reading.cpu_usage_percent,
                free_memory = reading.free_memory_percent,
                "Rejecting request under load"
            );
        }
        admit
    }
}
