//! Outbound health probes
//!
//! A probe never fails outward: transport errors and timeouts degrade to a
//! status of 0 with the elapsed time as latency.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Status recorded when no HTTP response was obtained
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// Result of probing one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: u16,
    pub latency_ms: u64,
}

impl ProbeOutcome {
    pub fn failed(elapsed: Duration) -> Self {
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            latency_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Fetch primitive used by the health scheduler
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HEAD-request prober backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("logshard-health/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build probe client, using defaults");
                Client::new()
            });

        Self { client, timeout }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        // Outer timeout also bounds DNS and connect on clients without one
        let result = tokio::time::timeout(self.timeout, self.client.head(url).send()).await;

        match result {
            Ok(Ok(response)) => ProbeOutcome {
                status: response.status().as_u16(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "Health probe failed");
                ProbeOutcome::failed(start.elapsed())
            }
            Err(_) => {
                tracing::debug!(url = %url, timeout_ms = self.timeout.as_millis() as u64, "Health probe timed out");
                ProbeOutcome::failed(start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_records_response_code() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let prober = HttpProber::new(Duration::from_secs(5));
        let outcome = prober.probe(&format!("{}/health", server.uri())).await;

        assert_eq!(outcome.status, 503);
    }

    #[tokio::test]
    async fn test_probe_timeout_degrades_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let prober = HttpProber::new(Duration::from_millis(100));
        let outcome = prober.probe(&server.uri()).await;

        assert_eq!(outcome.status, TRANSPORT_FAILURE_STATUS);
        assert!(outcome.latency_ms >= 90);
    }

    #[tokio::test]
    async fn test_probe_connection_refused_degrades_to_zero() {
        let prober = HttpProber::new(Duration::from_secs(2));
        let outcome = prober.probe("http://127.0.0.1:1/").await;

        assert_eq!(outcome.status, TRANSPORT_FAILURE_STATUS);
    }
}
