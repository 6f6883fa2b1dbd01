/// Shared error type used across all Agent Hub crates.
///
/// Tagged variants rather than a string soup: orchestration layers inspect
/// the kind (`RateLimit`, `Provider { retriable }`, `Timeout`) to decide
/// whether to retry, surface, or swallow.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("auth: {0}")]
    Auth(String),

    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("validation: {message}")]
    Validation {
        message: String,
        detected_patterns: Vec<String>,
    },

    #[error("ambiguous citation prefix {prefix}: {matches} matches")]
    AmbiguousPrefix { prefix: String, matches: usize },

    #[error("graph: {0}")]
    Graph(String),

    #[error("audit store: {0}")]
    Audit(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether an orchestration layer may retry the failed operation.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::RateLimit { .. } | Error::Timeout(_) => true,
            Error::Provider { retriable, .. } => *retriable,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retriable() {
        assert!(Error::RateLimit {
            retry_after_secs: Some(5)
        }
        .is_retriable());
    }

    #[test]
    fn provider_retriable_flag_respected() {
        let e = Error::Provider {
            provider: "gemini".into(),
            message: "503".into(),
            retriable: true,
        };
        assert!(e.is_retriable());

        let e = Error::Provider {
            provider: "gemini".into(),
            message: "400".into(),
            retriable: false,
        };
        assert!(!e.is_retriable());
    }

    #[test]
    fn validation_is_not_retriable() {
        let e = Error::Validation {
            message: "too verbose".into(),
            detected_patterns: vec!["please".into()],
        };
        assert!(!e.is_retriable());
    }
}
