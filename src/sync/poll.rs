use anyhow::{Context, Result};
use async_trait::async_trait;

use super::transport::ReportSource;

/// Long-poll source: each GET blocks until the server has one report. The
/// next request is only issued once the caller asks for another frame, so at
/// most one request is ever outstanding.
pub struct LongPoll {
    client: reqwest::Client,
    url: String,
}

impl LongPoll {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReportSource for LongPoll {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("long-poll request to {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("long-poll endpoint {} rejected the request", self.url))?
            .text()
            .await
            .context("failed to read long-poll response body")?;
        Ok(Some(body))
    }

    fn describe(&self) -> String {
        format!("long-poll {}", self.url)
    }
}
