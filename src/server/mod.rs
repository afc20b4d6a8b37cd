//! Web server for admission-controlled uploads and health reporting.
//!
//! - `POST /upload`: CSV upload, gated by load, optionally by Basic auth,
//!   then run through the concurrency limiter
//! - `GET /health`: resource usage and dependency status
//! - `GET /health-check`: dependency data via the resilient client

mod handlers;
mod middleware;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::admission::AdmissionGate;
use crate::auth::BasicAuth;
use crate::config::Settings;
use crate::health::HealthAggregator;
use crate::limiter::ConcurrencyLimiter;
use crate::monitor::{ResourceMonitor, SystemMonitor};
use crate::resilience::{
    worst_case_duration, ExternalService, HttpExternalService, ResilientClient,
};
use crate::upload::{UploadPolicy, UploadProcessor};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub limiter: ConcurrencyLimiter,
    pub processor: Arc<UploadProcessor>,
    pub policy: UploadPolicy,
    pub health: Arc<HealthAggregator>,
    pub auth: Option<Arc<BasicAuth>>,
    pub body_limit: usize,
}

impl AppState {
    /// Wire components from settings around the given monitor and dependency.
    pub fn new(
        settings: &Settings,
        monitor: Arc<dyn ResourceMonitor>,
        external: Option<Arc<dyn ExternalService>>,
    ) -> Self {
        let client = external.map(|service| {
            Arc::new(ResilientClient::new(
                service,
                settings.retry_policy(),
                settings.breaker_config(),
            ))
        });

        Self {
            gate: Arc::new(AdmissionGate::new(
                Arc::clone(&monitor),
                settings.admission_thresholds(),
            )),
            limiter: ConcurrencyLimiter::new(settings.limiter_config()),
            processor: Arc::new(UploadProcessor::new(
                settings.upload_dir.clone(),
                settings.processing_delay,
            )),
            policy: settings.upload_policy(),
            health: Arc::new(HealthAggregator::new(monitor, client)),
            auth: settings
                .basic_auth()
                .map(|(user, hash)| Arc::new(BasicAuth::new(user, hash))),
            body_limit: settings.body_limit(),
        }
    }

    /// Wire components against the live host and the configured dependency.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let monitor: Arc<dyn ResourceMonitor> =
            Arc::new(SystemMonitor::new().context("Failed to start resource monitor")?);

        let external: Option<Arc<dyn ExternalService>> = match &settings.external_service_url {
            Some(url) => {
                let service = HttpExternalService::new(
                    &settings.external_service_name,
                    url,
                    settings.external_timeout,
                )
                .context("Failed to create HTTP client")?;
                info!(
                    service = settings.external_service_name.as_str(),
                    url = url.as_str(),
                    "External dependency configured, worst-case call time {:?}",
                    worst_case_duration(&settings.retry_policy(), settings.external_timeout)
                );
                Some(Arc::new(service))
            }
            None => None,
        };

        Ok(Self::new(settings, monitor, external))
    }
}

/// Start the web server and run until interrupted.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&settings.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.upload_dir.display()))?;

    let state = AppState::from_settings(settings)?;
    if state.auth.is_some() {
        info!("Basic authentication enabled for uploads");
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, finishing in-flight requests");
}
