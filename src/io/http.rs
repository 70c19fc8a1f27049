use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use anyhow::{Result, anyhow, bail};

/// Reader for a remote archive using HTTP Range requests.
///
/// Verifying an archive only touches its tail and the local headers.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Check `url` with a HEAD request for Range support and length.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let size = content_length(&client, &url).await?;
        debug!(%url, size, "remote archive");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Request the inclusive byte range `start..=end`.
    async fn fetch(&self, start: u64, end: u64) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&self.url)
            .header("Range", format!("bytes={start}-{end}"))
            .send()
            .await
    }
}

async fn content_length(client: &Client, url: &str) -> Result<u64> {
    let resp = client.head(url).send().await?;

    if !resp.status().is_success() {
        bail!("HTTP request failed with status: {}", resp.status());
    }

    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    if !header("accept-ranges").is_some_and(|v| v.contains("bytes")) {
        bail!("Remote server does not support Range requests");
    }

    header("content-length")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let expected = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retries = 0;

        while received < expected {
            let start = offset + received as u64;
            let result = match self.fetch(start, end).await {
                Ok(resp) if resp.status() != StatusCode::PARTIAL_CONTENT => {
                    bail!("HTTP request failed with status: {}", resp.status());
                }
                Ok(resp) => resp.bytes().await,
                Err(e) => Err(e),
            };

            match result {
                Ok(body) => {
                    if body.is_empty() {
                        bail!("Remote server returned an empty range at {start}");
                    }
                    let len = body.len().min(expected - received);
                    buf[received..received + len].copy_from_slice(&body[..len]);
                    received += len;
                    self.transferred_bytes
                        .fetch_add(len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retries += 1;
                    if retries >= self.max_retry {
                        bail!("Max retries exceeded: {e}");
                    }
                    warn!(retry = retries, max = self.max_retry, "connection error: {e}");
                    tokio::time::sleep(Duration::from_millis(500 * retries as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
