//! Runtime settings for the upload service.
//!
//! `Settings` is filled from CLI flags and environment variables by the
//! binary; each component's own configuration is derived from it here.

use std::path::PathBuf;
use std::time::Duration;

use crate::admission::AdmissionThresholds;
use crate::limiter::{LimiterConfig, DEFAULT_CAPACITY};
use crate::resilience::{BreakerConfig, RetryPolicy, DEFAULT_TIMEOUT};
use crate::upload::{UploadPolicy, CSV_MEDIA_TYPE, DEFAULT_MAX_UPLOAD_BYTES};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Extra request body allowance on top of the file limit for multipart framing.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,

    pub max_concurrent_uploads: usize,
    pub max_queued_uploads: Option<usize>,
    pub queue_timeout: Option<Duration>,
    pub max_upload_bytes: u64,
    pub processing_delay: Duration,

    pub cpu_threshold_percent: f64,
    pub free_memory_threshold_percent: f64,

    pub external_service_name: String,
    pub external_service_url: Option<String>,
    pub external_timeout: Duration,
    pub breaker_error_threshold_percent: f64,
    pub breaker_reset_timeout: Duration,
    pub breaker_window: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,

    pub basic_auth_username: Option<String>,
    pub basic_auth_password_hash: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let thresholds = AdmissionThresholds::default();
        let breaker = BreakerConfig::default();
        let retry = RetryPolicy::default();

        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            max_concurrent_uploads: DEFAULT_CAPACITY,
            max_queued_uploads: None,
            queue_timeout: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            processing_delay: crate::upload::DEFAULT_PROCESSING_DELAY,
            cpu_threshold_percent: thresholds.max_cpu_percent,
            free_memory_threshold_percent: thresholds.min_free_memory_percent,
            external_service_name: crate::health::DEFAULT_SERVICE_NAME.to_string(),
            external_service_url: None,
            external_timeout: DEFAULT_TIMEOUT,
            breaker_error_threshold_percent: breaker.error_threshold_percent,
            breaker_reset_timeout: breaker.reset_timeout,
            breaker_window: breaker.window,
            retry_max_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            basic_auth_username: None,
            basic_auth_password_hash: None,
        }
    }
}

impl Settings {
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            capacity: self.max_concurrent_uploads,
            max_queued: self.max_queued_uploads,
            queue_timeout: self.queue_timeout,
        }
    }

    pub fn admission_thresholds(&self) -> AdmissionThresholds {
        AdmissionThresholds {
            max_cpu_percent: self.cpu_threshold_percent,
            min_free_memory_percent: self.free_memory_threshold_percent,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: self.max_upload_bytes,
            allowed_media_type: CSV_MEDIA_TYPE.to_string(),
        }
    }

    /// Request body limit for the upload route.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES))
            .unwrap_or(usize::MAX)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            ..Default::default()
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            error_threshold_percent: self.breaker_error_threshold_percent,
            reset_timeout: self.breaker_reset_timeout,
            window: self.breaker_window,
            ..Default::default()
        }
    }

    /// Credentials, when both username and password hash are set.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.basic_auth_username, &self.basic_auth_password_hash) {
            (Some(user), Some(hash)) if !user.is_empty() && !hash.is_empty() => {
                Some((user.as_str(), hash.as_str()))
            }
            _ => None,
        }
    }
}
