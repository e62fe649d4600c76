use thiserror::Error;

use crate::digest::DigestError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid model name {name:?}: {reason}")]
    InvalidModelName { name: String, reason: &'static str },
    #[error("request to {url} failed: {source}")]
    Transport { url: String, #[source] source: reqwest::Error },
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("malformed response from {url}: {source}")]
    Decode { url: String, #[source] source: serde_json::Error },
    #[error(transparent)]
    Digest(#[from] DigestError),
    #[error("pull of {model} failed: {reason}")]
    PullFailed { model: String, reason: String },
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport { url: url.into(), source }
    }

    /// Transport blips and server-side overload are worth another attempt;
    /// everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request() || source.is_body()
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_retry_classification() {
        let st = |status| CoreError::Status { url: "u".into(), status, body: String::new() };
        assert!(st(503).is_retryable());
        assert!(st(429).is_retryable());
        assert!(!st(404).is_retryable());
        assert!(!st(400).is_retryable());
    }

    #[test]
    fn validation_errors_are_terminal() {
        let e = CoreError::InvalidModelName { name: "x:".into(), reason: "empty tag" };
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("empty tag"));
    }

    #[test]
    fn digest_failure_is_its_own_variant() {
        let json = serde_json::from_str::<u8>("x").unwrap_err();
        let e: CoreError = DigestError(json).into();
        assert!(matches!(e, CoreError::Digest(_)));
        assert!(!e.is_retryable());
    }
}
