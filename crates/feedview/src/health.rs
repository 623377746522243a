use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::Result;

/// A successful probe: the backend answered 200 with a JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct Healthy {
    /// The `status` member of the body, when the body is an object that has one.
    pub status: Option<String>,
    pub body: serde_json::Value,
}

impl Healthy {
    pub fn from_body(body: serde_json::Value) -> Self {
        let status = body
            .get("status")
            .and_then(|status| status.as_str())
            .map(str::to_string);
        Self { status, body }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Unreachable {
    #[error("backend unreachable: {0}")]
    Network(#[source] reqwest::Error),
    #[error("backend answered with status {0}")]
    Status(u16),
    #[error("backend sent an unparseable health body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Single-shot liveness check against the backend. Retrying is up to the caller.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn probe(&self) -> std::result::Result<Healthy, Unreachable>;
}

pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: Url,
}

impl HttpHealthProbe {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> std::result::Result<Healthy, Unreachable> {
        let response = self
            .client
            .get(self.url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(Unreachable::Network)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Unreachable::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(Unreachable::Network)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        debug!(url = %self.url, %body, "backend is healthy");

        Ok(Healthy::from_body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port, http_response, serve_once};

    fn probe_for(addr: std::net::SocketAddr) -> HttpHealthProbe {
        let url = Url::parse(&format!("http://{addr}/health")).unwrap();
        HttpHealthProbe::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_healthy_backend() {
        let response = http_response(
            "200 OK",
            "application/json",
            r#"{"status":"healthy","window":"RainMerge"}"#,
        );
        let (addr, server) = serve_once(response).await;

        let healthy = probe_for(addr).probe().await.unwrap();
        assert_eq!(healthy.status.as_deref(), Some("healthy"));
        assert_eq!(healthy.body["window"], "RainMerge");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /health "));
        assert!(request.contains("cache-control: no-cache"));
        assert!(request.contains("pragma: no-cache"));
    }

    #[tokio::test]
    async fn test_body_without_status_member_is_still_healthy() {
        let response = http_response("200 OK", "application/json", "[1, 2, 3]");
        let (addr, _server) = serve_once(response).await;

        let healthy = probe_for(addr).probe().await.unwrap();
        assert_eq!(healthy.status, None);
    }

    #[tokio::test]
    async fn test_service_unavailable() {
        let response = http_response("503 Service Unavailable", "text/plain", "down");
        let (addr, _server) = serve_once(response).await;

        let result = probe_for(addr).probe().await;
        assert!(matches!(result, Err(Unreachable::Status(503))));
    }

    #[tokio::test]
    async fn test_other_success_codes_are_not_healthy() {
        let response = http_response("204 No Content", "application/json", "");
        let (addr, _server) = serve_once(response).await;

        let result = probe_for(addr).probe().await;
        assert!(matches!(result, Err(Unreachable::Status(204))));
    }

    #[tokio::test]
    async fn test_unparseable_body() {
        let response = http_response("200 OK", "text/html", "<html>ngrok</html>");
        let (addr, _server) = serve_once(response).await;

        let result = probe_for(addr).probe().await;
        assert!(matches!(result, Err(Unreachable::Body(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let addr = closed_port().await;

        let result = probe_for(addr).probe().await;
        assert!(matches!(result, Err(Unreachable::Network(_))));
    }
}
