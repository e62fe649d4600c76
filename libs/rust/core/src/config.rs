//! Layered configuration: defaults, optional file, `MODEL_UPDATER__*` env.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use updater_resilience::RetryConfig;

use crate::inventory::{normalize_host, DEFAULT_OLLAMA_HOST};
use crate::model_ref::RefDefaults;
use crate::registry::DEFAULT_REGISTRY_URL;

pub const ENV_PREFIX: &str = "MODEL_UPDATER";
pub const CONFIG_FILE_ENV: &str = "MODEL_UPDATER_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    pub ollama_host: String,
    pub registry_url: String,
    pub default_namespace: String,
    pub default_tag: String,
    pub lookup_concurrency: usize,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub log_level: String,
}

impl UpdaterConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter.clamp(0.0, 1.0),
        }
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs.max(1)) }

    pub fn ref_defaults(&self) -> RefDefaults {
        RefDefaults { namespace: self.default_namespace.clone(), tag: self.default_tag.clone() }
    }

    pub fn lookup_concurrency(&self) -> usize { self.lookup_concurrency.max(1) }

    /// `OLLAMA_HOST` takes precedence over the configured host, matching how
    /// the service's own CLI picks its endpoint.
    pub fn with_ollama_host(mut self, env_host: Option<String>) -> Self {
        if let Some(h) = env_host.filter(|h| !h.trim().is_empty()) { self.ollama_host = h; }
        self.ollama_host = normalize_host(&self.ollama_host);
        self
    }
}

fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("ollama_host", DEFAULT_OLLAMA_HOST)?
        .set_default("registry_url", DEFAULT_REGISTRY_URL)?
        .set_default("default_namespace", "library")?
        .set_default("default_tag", "latest")?
        .set_default("lookup_concurrency", 4i64)?
        .set_default("request_timeout_secs", 30i64)?
        .set_default("retry.max_retries", 3i64)?
        .set_default("retry.base_delay_ms", 200i64)?
        .set_default("retry.max_delay_ms", 5000i64)?
        .set_default("retry.jitter", 0.25f64)?
        .set_default("log_level", "warn")?)
}

/// Load config from defaults, then `file` (or `MODEL_UPDATER_CONFIG_FILE`),
/// then the environment.
pub fn load_config(file: Option<&Path>) -> Result<UpdaterConfig> {
    let mut builder = builder_with_defaults()?;
    let file_path: Option<PathBuf> = file.map(Path::to_path_buf).or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));
    if let Some(path) = file_path {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));
    let cfg: UpdaterConfig = builder.build()?.try_deserialize()?;
    Ok(cfg.with_ollama_host(std::env::var("OLLAMA_HOST").ok()))
}
