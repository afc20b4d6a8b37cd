//! Web server command.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;

use upload_gate::config::{Settings, DEFAULT_PORT};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory uploaded files are stored in
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Uploads processed at the same time
    #[arg(long, env = "MAX_CONCURRENT_UPLOADS", default_value_t = 5)]
    max_concurrent_uploads: usize,

    /// Uploads allowed to wait for a slot (unbounded if unset)
    #[arg(long, env = "MAX_QUEUED_UPLOADS")]
    max_queued_uploads: Option<usize>,

    /// Give up on a queued upload after this many seconds
    #[arg(long, env = "QUEUE_TIMEOUT_SECS")]
    queue_timeout_secs: Option<u64>,

    /// Largest accepted file in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 262_144_000)]
    max_upload_bytes: u64,

    /// Simulated processing time per upload
    #[arg(long, env = "PROCESSING_DELAY_MS", default_value_t = 2000)]
    processing_delay_ms: u64,

    /// Reject uploads above this process CPU usage
    #[arg(long = "cpu-threshold", env = "CPU_THRESHOLD_PERCENT", default_value_t = 80.0)]
    cpu_threshold_percent: f64,

    /// Reject uploads below this share of free memory
    #[arg(
        long = "free-memory-threshold",
        env = "FREE_MEMORY_THRESHOLD_PERCENT",
        default_value_t = 20.0
    )]
    free_memory_threshold_percent: f64,

    /// URL of the external dependency reported on /health
    #[arg(long, env = "EXTERNAL_SERVICE_URL")]
    external_service_url: Option<String>,

    /// Per-attempt timeout for the external dependency
    #[arg(long, env = "EXTERNAL_TIMEOUT_MS", default_value_t = 5000)]
    external_timeout_ms: u64,

    /// Failure percentage that opens the circuit
    #[arg(
        long = "breaker-error-threshold",
        env = "BREAKER_ERROR_THRESHOLD_PERCENT",
        default_value_t = 50.0
    )]
    breaker_error_threshold_percent: f64,

    /// Time the circuit stays open before a trial call
    #[arg(long, env = "BREAKER_RESET_TIMEOUT_MS", default_value_t = 30_000)]
    breaker_reset_timeout_ms: u64,

    /// Rolling window for the failure percentage
    #[arg(long, env = "BREAKER_WINDOW_MS", default_value_t = 10_000)]
    breaker_window_ms: u64,

    /// Total attempts per external call
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 5)]
    retry_max_attempts: u32,

    /// Backoff before the first retry, doubled each time
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = 100)]
    retry_base_delay_ms: u64,

    #[arg(long, env = "BASIC_AUTH_USERNAME", hide = true)]
    basic_auth_username: Option<String>,

    #[arg(long, env = "BASIC_AUTH_PASSWORD", hide = true, hide_env_values = true)]
    basic_auth_password: Option<String>,
}

impl ServeArgs {
    pub fn into_settings(self) -> Settings {
        Settings {
            host: self.host,
            port: self.port,
            upload_dir: self.upload_dir,
            max_concurrent_uploads: self.max_concurrent_uploads,
            max_queued_uploads: self.max_queued_uploads,
            queue_timeout: self.queue_timeout_secs.map(Duration::from_secs),
            max_upload_bytes: self.max_upload_bytes,
            processing_delay: Duration::from_millis(self.processing_delay_ms),
            cpu_threshold_percent: self.cpu_threshold_percent,
            free_memory_threshold_percent: self.free_memory_threshold_percent,
            external_service_url: self.external_service_url.filter(|url| !url.is_empty()),
            external_timeout: Duration::from_millis(self.external_timeout_ms),
            breaker_error_threshold_percent: self.breaker_error_threshold_percent,
            breaker_reset_timeout: Duration::from_millis(self.breaker_reset_timeout_ms),
            breaker_window: Duration::from_millis(self.breaker_window_ms),
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            basic_auth_username: self.basic_auth_username.filter(|v| !v.is_empty()),
            basic_auth_password_hash: self.basic_auth_password.filter(|v| !v.is_empty()),
            ..Settings::default()
        }
    }
}

/// Start the web server.
pub async fn cmd_serve(settings: &Settings) -> anyhow::Result<()> {
    println!(
        "{} Starting upload server at http://{}:{}",
        style("→").cyan(),
        settings.host,
        settings.port
    );
    println!(
        "  {} concurrent uploads, files stored in {}",
        settings.max_concurrent_uploads,
        settings.upload_dir.display()
    );
    if settings.basic_auth_username.is_some() != settings.basic_auth_password_hash.is_some() {
        println!(
            "  {} Only one of BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD is set, auth disabled",
            style("!").yellow()
        );
    }
    println!("  Press Ctrl+C to stop");

    upload_gate::server::serve(settings).await
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeArgs,
    }

    /// Every env-backed flag given explicitly, so the process environment
    /// cannot leak into the result.
    fn parse(overrides: &[(&str, &str)]) -> Settings {
        let mut flags = vec![
            ("--host", "127.0.0.1"),
            ("--port", "3000"),
            ("--upload-dir", "uploads"),
            ("--max-concurrent-uploads", "5"),
            ("--max-queued-uploads", "50"),
            ("--queue-timeout-secs", "60"),
            ("--max-upload-bytes", "262144000"),
            ("--processing-delay-ms", "2000"),
            ("--cpu-threshold", "80"),
            ("--free-memory-threshold", "20"),
            ("--external-service-url", ""),
            ("--external-timeout-ms", "5000"),
            ("--breaker-error-threshold", "50"),
            ("--breaker-reset-timeout-ms", "30000"),
            ("--breaker-window-ms", "10000"),
            ("--retry-max-attempts", "5"),
            ("--retry-base-delay-ms", "100"),
            ("--basic-auth-username", ""),
            ("--basic-auth-password", ""),
        ];
        for (flag, value) in overrides {
            if let Some(entry) = flags.iter_mut().find(|(f, _)| *f == *flag) {
                entry.1 = *value;
            }
        }

        let argv = std::iter::once("serve")
            .chain(flags.iter().flat_map(|(flag, value)| [*flag, *value]));
        Harness::try_parse_from(argv).unwrap().args.into_settings()
    }

    #[test]
    fn test_flags_map_into_settings() {
        let settings = parse(&[
            ("--port", "8080"),
            ("--max-concurrent-uploads", "2"),
            ("--queue-timeout-secs", "30"),
            ("--cpu-threshold", "90"),
            ("--processing-delay-ms", "250"),
            ("--retry-base-delay-ms", "20"),
        ]);

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.max_concurrent_uploads, 2);
        assert_eq!(settings.max_queued_uploads, Some(50));
        assert_eq!(settings.queue_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.cpu_threshold_percent, 90.0);
        assert_eq!(settings.processing_delay, Duration::from_millis(250));
        assert_eq!(settings.retry_base_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_empty_values_disable_optional_features() {
        let settings = parse(&[]);

        assert!(settings.external_service_url.is_none());
        assert!(settings.basic_auth_username.is_none());
        assert!(settings.basic_auth_password_hash.is_none());
    }

    #[test]
    fn test_auth_and_dependency_pass_through() {
        let settings = parse(&[
            ("--external-service-url", "http://inventory.local/status"),
            ("--basic-auth-username", "admin"),
            ("--basic-auth-password", "$2b$10$hash"),
        ]);

        assert_eq!(
            settings.external_service_url.as_deref(),
            Some("http://inventory.local/status")
        );
        assert_eq!(settings.basic_auth(), Some(("admin", "$2b$10$hash")));
    }
}
