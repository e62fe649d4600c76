//! Pull driver: downloads one model at a time and renders its progress.

use std::io::Write;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use updater_resilience::{retry_if, RetryConfig};

use crate::error::{CoreError, Result};
use crate::inventory::ModelService;
use crate::progress::{PullProgress, ProgressRenderer};

pub struct UpdateDriver<'a, M: ModelService + ?Sized, W: Write + Send> {
    service: &'a M,
    retry: RetryConfig,
    renderer: Mutex<ProgressRenderer<W>>,
    updated: Vec<String>,
}

impl<'a, M: ModelService + ?Sized, W: Write + Send> UpdateDriver<'a, M, W> {
    pub fn new(service: &'a M, retry: RetryConfig, out: W) -> Self {
        Self { service, retry, renderer: Mutex::new(ProgressRenderer::new(out)), updated: Vec::new() }
    }

    /// Pull `name` until the service reports success. Interrupted transfers
    /// are retried; the service resumes partially downloaded layers itself.
    #[instrument(skip(self))]
    pub async fn update(&mut self, name: &str) -> Result<()> {
        self.renderer.lock().message(&format!("Updating {name}"))?;
        let service = self.service;
        let renderer = &self.renderer;
        let res = retry_if(&self.retry, CoreError::is_retryable, |attempt| async move {
            if attempt > 0 { info!(model = name, attempt, "pull_resumed"); }
            let mut on_progress = |p: &PullProgress| {
                if let Err(e) = renderer.lock().render(p) { debug!(error = %e, "progress_render_failed"); }
            };
            service.pull(name, &mut on_progress).await
        }).await;
        self.renderer.lock().finish()?;
        match res {
            Ok(()) => {
                info!(model = name, "model_updated");
                self.updated.push(name.to_string());
                Ok(())
            }
            Err(e) => {
                warn!(model = name, error = %e, "model_update_failed");
                Err(e)
            }
        }
    }

    /// Print a line on the driver's output.
    pub fn say(&self, text: &str) -> Result<()> {
        self.renderer.lock().message(text)?;
        Ok(())
    }

    /// Names pulled successfully so far, in order.
    pub fn updated(&self) -> &[String] { &self.updated }

    pub fn into_output(self) -> W { self.renderer.into_inner().into_inner() }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeService;
    use super::*;
    use std::time::Duration;

    fn ev(completed: u64, total: u64) -> PullProgress {
        PullProgress { status: "pulling".into(), digest: None, total, completed }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig { max_retries: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), jitter: 0.0 }
    }

    #[tokio::test]
    async fn renders_progress_and_newline() {
        let mut svc = FakeService::default();
        svc.progress.insert("llama2:7b".into(), vec![ev(50, 200), ev(200, 200)]);
        let mut driver = UpdateDriver::new(&svc, RetryConfig::none(), Vec::new());
        driver.update("llama2:7b").await.unwrap();
        assert_eq!(driver.updated(), ["llama2:7b".to_string()]);
        let out = String::from_utf8(driver.into_output()).unwrap();
        assert!(out.starts_with("Updating llama2:7b\n"));
        assert!(out.contains("\rProgress: 50/200 (25.00%)"));
        assert!(out.contains("(100.00%)"));
        assert!(out.ends_with('\n'));
    }

    #[tokio::test]
    async fn retryable_failure_is_retried() {
        let svc = FakeService::default();
        svc.failures.lock().insert("m:1".into(), vec![CoreError::Status { url: "u".into(), status: 503, body: String::new() }]);
        let mut driver = UpdateDriver::new(&svc, fast_retry(), Vec::new());
        driver.update("m:1").await.unwrap();
        assert_eq!(svc.pulls.lock().len(), 2);
    }

    #[tokio::test]
    async fn terminal_failure_is_returned() {
        let svc = FakeService::default();
        svc.failures.lock().insert("m:1".into(), vec![CoreError::PullFailed { model: "m:1".into(), reason: "manifest unknown".into() }]);
        let mut driver = UpdateDriver::new(&svc, fast_retry(), Vec::new());
        let err = driver.update("m:1").await.unwrap_err();
        assert!(matches!(err, CoreError::PullFailed { .. }));
        assert_eq!(svc.pulls.lock().len(), 1);
        assert!(driver.updated().is_empty());
    }
}
