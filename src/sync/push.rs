use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use log::warn;
use reqwest::header::ACCEPT;

use super::transport::ReportSource;

/// Longest unterminated line kept in memory. Check reports may carry an
/// inline JPEG, so this is generous.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Server-push report stream (`text/event-stream`), one JSON report per
/// `data:` event. A dropped connection surfaces as an error; the next call
/// reconnects.
pub struct PushStream {
    client: reqwest::Client,
    url: String,
    stream: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    buffer: Vec<u8>,
    max_line_bytes: usize,
    /// Set after an oversized line was dropped; the rest of it is skipped.
    skipping_line: bool,
    data_lines: Vec<String>,
    pending: VecDeque<String>,
}

impl PushStream {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            stream: None,
            buffer: Vec::new(),
            max_line_bytes: MAX_LINE_BYTES,
            skipping_line: false,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("failed to open event stream {}", self.url))?
            .error_for_status()
            .with_context(|| format!("event stream {} rejected the request", self.url))?;

        self.stream = Some(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.skipping_line = false;
        self.data_lines.clear();
    }

    /// Splits buffered bytes into lines and completes events on blank lines.
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.skipping_line {
                self.skipping_line = false;
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    self.pending.push_back(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
            // event:, id:, retry: and comment lines carry nothing we use.
        }

        if self.buffer.len() > self.max_line_bytes {
            warn!(
                "Dropping event stream line over {} bytes from {}",
                self.max_line_bytes, self.url
            );
            self.buffer.clear();
            self.skipping_line = true;
        }
    }
}

#[async_trait]
impl ReportSource for PushStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            if self.stream.is_none() {
                self.connect().await?;
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            let next = stream.next().await;
            match next {
                Some(Ok(chunk)) => self.feed(&chunk),
                Some(Err(err)) => {
                    self.reset();
                    return Err(anyhow!(err).context("event stream read failed"));
                }
                None => {
                    self.reset();
                    bail!("event stream {} closed by server", self.url);
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("push stream {}", self.url)
    }
}
