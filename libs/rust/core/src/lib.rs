//! Core of model-updater: finds locally cached models whose registry manifest
//! changed and pulls them again.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub const JSON_LOG_ENV: &str = "MODEL_UPDATER_JSON_LOG";

/// Install the global subscriber once. Logs go to stderr so stdout stays
/// reserved for menus and progress. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var(JSON_LOG_ENV).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let (json_layer, text_layer) = if json {
            let layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr);
            (Some(layer), None)
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_writer(std::io::stderr);
            (None, Some(layer))
        };
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    debug!(service, "tracing_initialized");
    Ok(())
}

pub mod config;
pub mod digest;
pub mod error;
pub mod inventory;
pub mod model_ref;
pub mod progress;
pub mod registry;
pub mod selection;
pub mod staleness;
pub mod update;

pub use config::{load_config, UpdaterConfig};
pub use digest::{digest_bytes, digest_value, normalize_digest, DigestError};
pub use error::CoreError;
pub use inventory::{LocalModel, ModelService, OllamaClient, ProgressFn};
pub use model_ref::{ModelRef, RefDefaults};
pub use progress::{percent, ProgressRenderer, PullProgress};
pub use registry::{ManifestSource, RegistryClient, RemoteIdentity};
pub use selection::{run_updates, LinePrompter, Mode, Prompter, Selection, SessionState};
pub use staleness::{classify, find_stale, Freshness};
pub use update::UpdateDriver;
