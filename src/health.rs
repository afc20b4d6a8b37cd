//! Health aggregation.
//!
//! Combines a resource reading with the status of the external dependency.
//! A failing dependency is reported alongside an otherwise healthy process
//! rather than failing the report; only an unreadable host is `unhealthy`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::monitor::ResourceMonitor;
use crate::resilience::{ExternalServiceUnavailable, ResilientClient};

/// Name under which the dependency appears when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "externalApi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalStatus {
    Healthy,
    Unavailable,
    NotConfigured,
    /// Configured but not queried, because the report failed first.
    Unknown,
}

/// Point-in-time health of the process and its dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub cpu_usage_percent: Option<f64>,
    pub free_memory_percent: Option<f64>,
    pub external_service_name: String,
    pub external_service_status: ExternalStatus,
    /// Diagnostic reason when `status` is unhealthy.
    pub error: Option<String>,
}

/// Builds [`HealthReport`]s on demand.
pub struct HealthAggregator {
    monitor: Arc<dyn ResourceMonitor>,
    client: Option<Arc<ResilientClient>>,
}

impl HealthAggregator {
    pub fn new(monitor: Arc<dyn ResourceMonitor>, client: Option<Arc<ResilientClient>>) -> Self {
        Self { monitor, client }
    }

    fn service_name(&self) -> String {
        self.client
            .as_ref()
            .map(|c| c.service_name().to_string())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string())
    }

    fn unchecked_status(&self) -> ExternalStatus {
        if self.client.is_some() {
            ExternalStatus::Unknown
        } else {
            ExternalStatus::NotConfigured
        }
    }

    pub async fn report(&self) -> HealthReport {
        let resources = match self.monitor.snapshot() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Health check could not read system resources: {}", e);
                return HealthReport {
                    status: HealthStatus::Unhealthy,
                    cpu_usage_percent: None,
                    free_memory_percent: None,
                    external_service_name: self.service_name(),
                    external_service_status: self.unchecked_status(),
                    error: Some(format!("Unable to read system resources: {}", e)),
                };
            }
        };

        let external_service_status = match &self.client {
            None => ExternalStatus::NotConfigured,
            Some(client) => match client.call().await {
                Ok(_) => ExternalStatus::Healthy,
                Err(ExternalServiceUnavailable) => ExternalStatus::Unavailable,
            },
        };

        HealthReport {
            status: HealthStatus::Healthy,
            cpu_usage_percent: Some(resources.cpu_usage_percent),
            free_memory_percent: Some(resources.free_memory_percent),
            external_service_name: self.service_name(),
            external_service_status,
            error: None,
        }
    }

    /// Data reported by the external dependency itself.
    pub async fn external_data(&self) -> Result<Value, ExternalServiceUnavailable> {
        match &self.client {
            Some(client) => client.call().await,
            None => Err(ExternalServiceUnavailable),
        }
    }
}
