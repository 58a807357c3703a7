//! HTTP health probes for auxiliary services

use docbro_core::config::ServiceEndpoint;
use futures::future::join_all;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of probing one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    pub available: bool,
    pub required: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Issues GET requests against service health endpoints
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    client: reqwest::Client,
}

impl ServiceProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Probe a single endpoint; any 2xx answer counts as available
    pub async fn probe(&self, endpoint: &ServiceEndpoint) -> ServiceStatus {
        let start = Instant::now();
        let result = self.client.get(&endpoint.url).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (available, status_code, error) = match result {
            Ok(response) => {
                let status = response.status();
                let error = (!status.is_success()).then(|| format!("HTTP {}", status));
                (status.is_success(), Some(status.as_u16()), error)
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection refused"
                } else {
                    "request failed"
                };
                (false, None, Some(format!("{}: {}", kind, e)))
            }
        };

        debug!(
            service = %endpoint.name,
            available,
            latency_ms,
            "probed service"
        );

        ServiceStatus {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            available,
            required: endpoint.required,
            status_code,
            error,
            latency_ms,
        }
    }

    pub async fn probe_all(&self, endpoints: &[ServiceEndpoint]) -> Vec<ServiceStatus> {
        join_all(endpoints.iter().map(|e| self.probe(e))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(name: &str, url: String) -> ServiceEndpoint {
        ServiceEndpoint {
            name: name.to_string(),
            url,
            required: false,
        }
    }

    #[tokio::test]
    async fn test_probe_healthy_and_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = ServiceProbe::new(Duration::from_secs(2)).unwrap();
        let statuses = probe
            .probe_all(&[
                endpoint("qdrant", format!("{}/healthz", server.uri())),
                endpoint("ollama", format!("{}/down", server.uri())),
            ])
            .await;

        assert!(statuses[0].available);
        assert_eq!(statuses[0].status_code, Some(200));
        assert!(!statuses[1].available);
        assert_eq!(statuses[1].status_code, Some(503));
        assert!(statuses[1].error.is_some());
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let probe = ServiceProbe::new(Duration::from_millis(500)).unwrap();
        let status = probe
            .probe(&endpoint("qdrant", "http://127.0.0.1:1/healthz".to_string()))
            .await;
        assert!(!status.available);
        assert!(status.status_code.is_none());
    }
}
