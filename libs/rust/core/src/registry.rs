//! Remote identity lookups against a registry's manifest endpoint.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use opentelemetry::{global, metrics::Counter, KeyValue};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use updater_resilience::{retry_if, RetryConfig};

use crate::digest::{digest_bytes, digest_value, normalize_digest};
use crate::error::{CoreError, Result};
use crate::model_ref::ModelRef;

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DEFAULT_REGISTRY_URL: &str = "https://ollama.ai";

static LOOKUPS: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("updater-core")
        .u64_counter("updater_registry_lookups_total")
        .with_description("Registry manifest lookups by outcome")
        .build()
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub digest: String,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The part of a registry manifest the comparison relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub config: Descriptor,
}

/// What the registry currently serves for a model reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub config_digest: String,
    /// SHA-256 of the manifest body as served.
    pub manifest_digest: String,
    /// SHA-256 of the canonical encoding of the decoded manifest.
    pub canonical_digest: String,
}

impl RemoteIdentity {
    pub fn from_body(url: &str, body: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(body)
            .map_err(|source| CoreError::Decode { url: url.to_string(), source })?;
        let canonical_digest = digest_value(&manifest)?;
        Ok(Self {
            config_digest: manifest.config.digest,
            manifest_digest: digest_bytes(body),
            canonical_digest,
        })
    }

    /// Whether the local digest names the artifact the registry serves.
    pub fn matches(&self, local_digest: &str) -> bool {
        let local = normalize_digest(local_digest);
        if local.is_empty() { return false; }
        [&self.config_digest, &self.manifest_digest, &self.canonical_digest]
            .iter()
            .any(|d| normalize_digest(d) == local)
    }
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// `Ok(None)` when the registry does not answer with success for this
    /// reference; the model's state is then unknown rather than stale.
    async fn lookup(&self, model: &ModelRef) -> Result<Option<RemoteIdentity>>;
}

/// Registry client holding one connection pool for the whole run.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("model-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::transport(base_url, e))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), retry })
    }

    pub fn manifest_url(&self, model: &ModelRef) -> String {
        match &model.host {
            Some(host) => format!("https://{}/{}", host, model.manifest_path()),
            None => format!("{}/{}", self.base_url, model.manifest_path()),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Option<RemoteIdentity>> {
        let resp = self.http.get(url).header(ACCEPT, MANIFEST_MEDIA_TYPE).send().await
            .map_err(|e| CoreError::transport(url, e))?;
        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CoreError::Status { url: url.to_string(), status: status.as_u16(), body: String::new() });
        }
        if status != reqwest::StatusCode::OK {
            debug!(%url, status = status.as_u16(), "manifest_unavailable");
            return Ok(None);
        }
        let body = resp.bytes().await.map_err(|e| CoreError::transport(url, e))?;
        Ok(Some(RemoteIdentity::from_body(url, &body)?))
    }
}

#[async_trait]
impl ManifestSource for RegistryClient {
    #[instrument(skip(self, model), fields(model = %model))]
    async fn lookup(&self, model: &ModelRef) -> Result<Option<RemoteIdentity>> {
        let url = self.manifest_url(model);
        let res = retry_if(&self.retry, CoreError::is_retryable, |_attempt| self.fetch_once(&url)).await;
        let outcome = match &res {
            Ok(Some(_)) => "found",
            Ok(None) => "unavailable",
            Err(CoreError::Status { .. }) => "unavailable",
            Err(_) => "error",
        };
        LOOKUPS.add(1, &[KeyValue::new("outcome", outcome)]);
        match res {
            // Overloaded registry after all retries: unknown, same as any other non-success status.
            Err(CoreError::Status { status, .. }) => {
                debug!(%url, status, "manifest_unavailable_after_retries");
                Ok(None)
            }
            other => other,
        }
    }
}
