//! HTTP-backed external dependency.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{ExternalCallError, ExternalService};

/// Default per-attempt timeout for external calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// User agent sent with outbound calls.
pub const USER_AGENT: &str = concat!("upload-gate/", env!("CARGO_PKG_VERSION"));

/// Fetches a JSON document from a fixed URL.
#[derive(Clone)]
pub struct HttpExternalService {
    client: Client,
    name: String,
    url: String,
    timeout: Duration,
}

impl HttpExternalService {
    /// Create a service that GETs `url`, giving each attempt `timeout`.
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            name: name.to_string(),
            url: url.to_string(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> ExternalCallError {
        if err.is_timeout() {
            ExternalCallError::Timeout(self.timeout)
        } else if let Some(status) = err.status() {
            ExternalCallError::from_status(status.as_u16())
        } else if err.is_decode() {
            ExternalCallError::InvalidResponse(err.to_string())
        } else {
            ExternalCallError::Connect(err.to_string())
        }
    }
}

#[async_trait]
impl ExternalService for HttpExternalService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Value, ExternalCallError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalCallError::from_status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;

        // Non-JSON bodies are passed through as a string.
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::FailureKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service_for(server: &MockServer) -> HttpExternalService {
        HttpExternalService::new(
            "status-api",
            &format!("{}/status", server.uri()),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let data = service_for(&server).await.fetch().await.unwrap();
        assert_eq!(data, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_fetch_passes_text_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let data = service_for(&server).await.fetch().await.unwrap();
        assert_eq!(data, Value::String("pong".to_string()));
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let first = service.fetch().await.unwrap_err();
        assert!(matches!(first, ExternalCallError::ServerError(503)));
        assert_eq!(first.kind(), FailureKind::Transient);

        let second = service.fetch().await.unwrap_err();
        assert!(matches!(second, ExternalCallError::ClientError(404)));
        assert_eq!(second.kind(), FailureKind::Permanent);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = service_for(&server).await.fetch().await.unwrap_err();
        assert!(matches!(err, ExternalCallError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let service =
            HttpExternalService::new("down", "http://127.0.0.1:9/", Duration::from_millis(500))
                .unwrap();
        let err = service.fetch().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
    }
}
