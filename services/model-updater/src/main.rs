use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use updater_core::{
    find_stale, init_tracing, load_config, run_updates, LinePrompter, Mode, ModelService, OllamaClient, RegistryClient,
    SessionState, UpdateDriver,
};

#[derive(Parser, Debug)]
#[command(name = "model-updater")]
#[command(about = "Check locally cached models against the registry and pull the stale ones")]
struct Cli {
    /// Interactive mode (currently always on unless --force is given)
    #[arg(short, long, default_value_t = true)]
    interactive: bool,

    /// Update every stale model without asking
    #[arg(short, long)]
    force: bool,

    /// Config file (YAML, TOML or JSON); defaults to $MODEL_UPDATER_CONFIG_FILE
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn mode(&self) -> Mode { if self.force { Mode::Force } else { Mode::Interactive } }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = report_failure(&e, &mut io::stderr().lock());
            ExitCode::FAILURE
        }
    }
}

/// The single stderr line for a fatal error, with its context chain.
fn report_failure(err: &anyhow::Error, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Error: {err:#}")
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref()).context("loading configuration")?;
    init_tracing("model-updater", &cfg.log_level)?;
    debug!(?cli, ?cfg, "config_loaded");
    if !cli.force { debug!(interactive = cli.interactive, "interactive_mode"); }

    let service = OllamaClient::new(&cfg.ollama_host, cfg.request_timeout())?;
    let registry = RegistryClient::new(&cfg.registry_url, cfg.request_timeout(), cfg.retry_config())?;

    let inventory = service.list().await.with_context(|| format!("listing local models at {}", service.host()))?;
    let stale = find_stale(&inventory, &registry, &cfg.ref_defaults(), cfg.lookup_concurrency())
        .await
        .context("checking models against the registry")?;
    drop(registry);
    info!(local = inventory.len(), stale = stale.len(), mode = ?cli.mode(), "update_plan");

    let mut driver = UpdateDriver::new(&service, cfg.retry_config(), io::stdout());
    let mut prompter = LinePrompter::new(io::stdin().lock(), io::stdout());
    let end = run_updates(&mut driver, &stale, cli.mode(), &mut prompter).await?;
    if end == SessionState::Cancelled { debug!("selection_cancelled"); }
    info!(updated = driver.updated().len(), "finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_interactive() {
        let cli = Cli::try_parse_from(["model-updater"]).unwrap();
        assert!(cli.interactive);
        assert!(!cli.force);
        assert_eq!(cli.mode(), Mode::Interactive);
    }

    #[test]
    fn force_flag_selects_force_mode() {
        for args in [vec!["model-updater", "-f"], vec!["model-updater", "--force"], vec!["model-updater", "-i", "-f"]] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert_eq!(cli.mode(), Mode::Force);
        }
    }

    #[test]
    fn config_path_flag() {
        let cli = Cli::try_parse_from(["model-updater", "--config", "/etc/model-updater.yaml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/model-updater.yaml")));
    }

    #[test]
    fn fatal_error_is_reported_once() {
        let err = anyhow::anyhow!("connection refused").context("listing local models at http://127.0.0.1:11434");
        let mut out = Vec::new();
        report_failure(&err, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Error: listing local models at http://127.0.0.1:11434: connection refused\n");
        assert_eq!(text.lines().count(), 1);
    }
}
