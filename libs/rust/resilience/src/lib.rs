//! Resilience utilities: retry with exponential backoff + jitter.
use std::future::Future;
use std::time::Duration;
use once_cell::sync::Lazy;
use opentelemetry::{global, metrics::Counter};
use rand::{thread_rng, Rng};
use tracing::{debug, warn};

static RETRY_ATTEMPTS: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("updater-resilience")
        .u64_counter("updater_resilience_retry_attempts_total")
        .with_description("Total retry attempts executed")
        .build()
});

static RETRY_EXHAUSTED: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("updater-resilience")
        .u64_counter("updater_resilience_retry_exhausted_total")
        .with_description("Operations that failed after the last allowed retry")
        .build()
});

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl Default for RetryConfig { fn default() -> Self { Self { max_retries: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_millis(5000), jitter: 0.25 } } }

impl RetryConfig {
    /// No retries at all; the first failure is returned as-is.
    pub fn none() -> Self { Self { max_retries: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO, jitter: 0.0 } }

    /// Backoff before retry number `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        std::cmp::min(exp, self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter.min(1.0)) as i64;
        let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        let ms = delay.as_millis() as i64 + offset;
        Duration::from_millis(ms.max(0) as u64)
    }
}

/// Retry `op` on every error until it succeeds or `max_retries` is used up.
pub async fn retry_async<F, Fut, T, E>(cfg: &RetryConfig, op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_if(cfg, |_: &E| true, op).await
}

/// Retry `op` only while `should_retry` accepts the error. Terminal errors are
/// returned immediately.
pub async fn retry_if<F, Fut, T, E, P>(cfg: &RetryConfig, mut should_retry: P, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempt >= cfg.max_retries => {
                if cfg.max_retries > 0 { RETRY_EXHAUSTED.add(1, &[]); }
                return Err(e);
            }
            Err(_) => {
                let delay = cfg.jittered(attempt);
                RETRY_ATTEMPTS.add(1, &[]);
                warn!(attempt = attempt + 1, max_retries = cfg.max_retries, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
        debug!(attempt, "retry_attempt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryConfig { RetryConfig { max_retries: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(10), jitter: 0.0 } }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let mut attempts = 0;
        let res: Result<usize, &str> = retry_async(&fast(), |_i| {
            attempts += 1;
            let n = attempts;
            async move { if n < 3 { Err("fail") } else { Ok(42) } }
        }).await;
        assert_eq!(res.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut attempts = 0;
        let res: Result<(), &str> = retry_async(&fast(), |_| { attempts += 1; async { Err("down") } }).await;
        assert_eq!(res.unwrap_err(), "down");
        assert_eq!(attempts, 4); // first try + 3 retries
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let mut attempts = 0;
        let res: Result<(), u16> = retry_if(&fast(), |e: &u16| *e >= 500, |_| { attempts += 1; async { Err(404) } }).await;
        assert_eq!(res.unwrap_err(), 404);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_none_config_single_attempt() {
        let mut attempts = 0;
        let _: Result<(), ()> = retry_async(&RetryConfig::none(), |_| { attempts += 1; async { Err(()) } }).await;
        assert_eq!(attempts, 1);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let cfg = RetryConfig { max_retries: 10, base_delay: Duration::from_millis(100), max_delay: Duration::from_millis(1000), jitter: 0.0 };
        assert_eq!(cfg.backoff(0), Duration::from_millis(100));
        assert_eq!(cfg.backoff(1), Duration::from_millis(200));
        assert_eq!(cfg.backoff(3), Duration::from_millis(800));
        assert_eq!(cfg.backoff(4), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(60), Duration::from_millis(1000));
    }
}
