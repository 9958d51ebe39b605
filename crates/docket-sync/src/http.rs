//! HTTP fetcher for court-filing downloads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{FetchError, FetchResponse, Fetcher};

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Base for relative document URLs, e.g. `https://oficinajudicialvirtual.pjud.cl`.
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Extra attempts after a transport error or a 5xx response.
    pub retries: u32,
    /// Backoff unit; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(60),
            retries: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

/// `reqwest`-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .map(|b| b.trim_end_matches('/').to_string()),
            retries: config.retries,
            backoff: config.backoff,
        })
    }

    /// Absolute URL for `url`, joining relative paths onto the base.
    pub fn resolve(&self, url: &str) -> Result<String, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        match &self.base_url {
            Some(base) if !url.is_empty() => {
                Ok(format!("{base}/{}", url.trim_start_matches('/')))
            }
            _ => Err(FetchError::InvalidUrl(url.to_string())),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(url)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt > self.retries;
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_server_error() && !last => {
                    warn!(url = %url, status = resp.status().as_u16(), attempt, "server error, retrying");
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let bytes = resp.bytes().await?.to_vec();
                    debug!(url = %url, status, size = bytes.len(), "fetched");
                    return Ok(FetchResponse { status, bytes });
                }
                Err(e) if !last => {
                    warn!(url = %url, error = %e, attempt, "transport error, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}
