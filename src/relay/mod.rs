use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::PipelineError;
use crate::Result;

/// Minimal response shape carried back from a transport call
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| anyhow::anyhow!("Failed to parse response body: {}", e))
    }
}

/// Seam over the HTTP client so every network call can be faked in tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<RawResponse>;

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<RawResponse>;

    async fn post_file(
        &self,
        url: &str,
        field: String,
        file_name: String,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<RawResponse>;
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn collect(response: reqwest::Response) -> Result<RawResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        Self::collect(request.send().await?).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let mut request = self.client.post(url).timeout(timeout).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        Self::collect(request.send().await?).await
    }

    async fn post_file(
        &self,
        url: &str,
        field: String,
        file_name: String,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let part = reqwest::multipart::Part::bytes(payload).file_name(file_name);
        let form = reqwest::multipart::Form::new().part(field, part);

        let request = self.client.post(url).timeout(timeout).multipart(form);
        Self::collect(request.send().await?).await
    }
}

/// Fetches a target URL by trying an ordered list of relay proxies.
///
/// The origin platform enforces referrer restrictions that make direct
/// requests fail, so every fetch goes through a passthrough proxy. Relay
/// order is a priority, not a guarantee; the first response the accept
/// predicate approves wins, and a relay that errors or returns garbage is
/// simply skipped. Each attempt carries its own timeout so one dead relay
/// cannot stall the whole loop.
pub struct RelayFetcher {
    transport: Arc<dyn HttpTransport>,
    relays: Vec<String>,
    attempt_timeout: Duration,
}

impl RelayFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, relays: Vec<String>, attempt_timeout: Duration) -> Self {
        Self {
            transport,
            relays,
            attempt_timeout,
        }
    }

    /// Build the proxied URL for one relay template, percent-encoding the target
    fn proxied_url(template: &str, target: &str) -> String {
        template.replace("{target}", urlencoding::encode(target).as_ref())
    }

    /// Try each relay in order; return the first response `accept` approves
    pub async fn fetch<F>(
        &self,
        target: &str,
        headers: &[(String, String)],
        accept: F,
    ) -> std::result::Result<RawResponse, PipelineError>
    where
        F: Fn(&RawResponse) -> bool,
    {
        for (index, template) in self.relays.iter().enumerate() {
            let proxied = Self::proxied_url(template, target);
            tracing::debug!("Relay attempt {}/{}: {}", index + 1, self.relays.len(), proxied);

            match self
                .transport
                .get(&proxied, headers.to_vec(), self.attempt_timeout)
                .await
            {
                Ok(response) if accept(&response) => {
                    tracing::debug!(
                        "Relay {} accepted ({} bytes, status {})",
                        index + 1,
                        response.body.len(),
                        response.status
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    tracing::debug!(
                        "Relay {} rejected by accept predicate (status {}, {} bytes)",
                        index + 1,
                        response.status,
                        response.body.len()
                    );
                }
                Err(e) => {
                    tracing::debug!("Relay {} failed: {}", index + 1, e);
                }
            }
        }

        Err(PipelineError::AllRelaysExhausted {
            target: target.to_string(),
            attempts: self.relays.len(),
        })
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }
}
