//! Local model management service: inventory listing and pulls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::{CoreError, Result};
use crate::progress::PullProgress;

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Progress callback handed to [`ModelService::pull`].
pub type ProgressFn<'a> = dyn for<'p> FnMut(&'p PullProgress) + Send + 'a;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalModel {
    pub name: String,
    pub digest: String,
}

#[async_trait]
pub trait ModelService: Send + Sync {
    /// Every locally cached model, in the service's order.
    async fn list(&self) -> Result<Vec<LocalModel>>;

    /// Download `name`, reporting each progress event. Returns once the
    /// service reports success.
    async fn pull(&self, name: &str, on_progress: &mut ProgressFn<'_>) -> Result<()>;
}

/// Accepts `host`, `host:port`, `http://host:port` or `https://host`, without
/// a trailing slash. A bare host gets the service's default port; an explicit
/// scheme keeps its own default.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() { return DEFAULT_OLLAMA_HOST.to_string(); }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    let has_port = match trimmed.strip_prefix('[') {
        Some(v6) => v6.contains("]:"),
        None => trimmed.contains(':'),
    };
    if has_port {
        format!("http://{trimmed}")
    } else {
        format!("http://{trimmed}:{DEFAULT_OLLAMA_PORT}")
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    progress: PullProgress,
}

/// HTTP client for an Ollama-compatible model service.
pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    list_timeout: Duration,
}

impl OllamaClient {
    pub fn new(host: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| CoreError::transport(host, e))?;
        Ok(Self { http, host: normalize_host(host), list_timeout: request_timeout })
    }

    pub fn host(&self) -> &str { &self.host }
}

#[async_trait]
impl ModelService for OllamaClient {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<LocalModel>> {
        let url = format!("{}/api/tags", self.host);
        let resp = self.http.get(&url).timeout(self.list_timeout).send().await
            .map_err(|e| CoreError::transport(&url, e))?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| CoreError::transport(&url, e))?;
        if !status.is_success() {
            return Err(CoreError::Status { url, status: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() });
        }
        let tags: TagsResponse = serde_json::from_slice(&body).map_err(|source| CoreError::Decode { url: url.clone(), source })?;
        info!(count = tags.models.len(), "inventory_listed");
        Ok(tags.models)
    }

    #[instrument(skip(self, on_progress))]
    async fn pull(&self, name: &str, on_progress: &mut ProgressFn<'_>) -> Result<()> {
        let url = format!("{}/api/pull", self.host);
        let resp = self.http.post(&url)
            .json(&serde_json::json!({ "model": name, "stream": true }))
            .send().await
            .map_err(|e| CoreError::transport(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CoreError::Status { url, status: status.as_u16(), body });
        }

        let mut lines = LineBuffer::default();
        let mut stream = resp.bytes_stream();
        let mut succeeded = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::transport(&url, e))?;
            lines.extend(&chunk);
            while let Some(line) = lines.next_line() {
                succeeded |= handle_pull_line(&url, name, &line, on_progress)?;
            }
        }
        if let Some(rest) = lines.take_remainder() {
            succeeded |= handle_pull_line(&url, name, &rest, on_progress)?;
        }
        if !succeeded {
            return Err(CoreError::PullFailed { model: name.to_string(), reason: "stream ended before success".into() });
        }
        debug!(model = name, "pull_complete");
        Ok(())
    }
}

/// Returns whether the line was the terminal success event.
fn handle_pull_line(url: &str, model: &str, line: &[u8], on_progress: &mut ProgressFn<'_>) -> Result<bool> {
    if line.iter().all(u8::is_ascii_whitespace) { return Ok(false); }
    let parsed: PullLine = serde_json::from_slice(line).map_err(|source| CoreError::Decode { url: url.to_string(), source })?;
    if let Some(reason) = parsed.error {
        return Err(CoreError::PullFailed { model: model.to_string(), reason });
    }
    on_progress(&parsed.progress);
    Ok(parsed.progress.is_success())
}

/// Splits a chunked byte stream into newline-terminated lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, chunk: &[u8]) { self.buf.extend_from_slice(chunk); }

    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let line = self.buf.split_to(pos).to_vec();
        self.buf.advance(1);
        Some(line)
    }

    pub(crate) fn take_remainder(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() { return None; }
        Some(self.buf.split().to_vec())
    }
}
