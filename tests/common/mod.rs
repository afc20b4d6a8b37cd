#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;

use upload_gate::config::Settings;
use upload_gate::monitor::StaticMonitor;
use upload_gate::resilience::ExternalService;
use upload_gate::server::{create_router, AppState};

pub const BOUNDARY: &str = "upload-gate-integration";

pub fn settings(dir: &TempDir, processing_delay: Duration) -> Settings {
    Settings {
        upload_dir: dir.path().to_path_buf(),
        processing_delay,
        ..Settings::default()
    }
}

pub fn app(settings: &Settings, external: Option<Arc<dyn ExternalService>>) -> Router {
    let monitor = Arc::new(StaticMonitor::new(5.0, 75.0));
    create_router(AppState::new(settings, monitor, external))
}

pub fn csv_upload(file_name: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
