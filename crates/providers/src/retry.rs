//! Retry engine for provider calls.
//!
//! Retries only errors flagged retriable (`RateLimit`, `Timeout`,
//! `Provider { retriable: true }`), honoring a server-provided
//! `retry_after` hint over the computed backoff.

use std::future::Future;
use std::time::Duration;

use ah_domain::error::{Error, Result};

/// Run `op` with up to `max_retries` retries and exponential backoff.
pub async fn with_retries<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<Error> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = match &last_err {
                Some(Error::RateLimit {
                    retry_after_secs: Some(secs),
                }) => Duration::from_secs(*secs),
                _ => Duration::from_millis(250 * 2u64.pow(attempt - 1)),
            };
            tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying");
            tokio::time::sleep(backoff).await;
        }

        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retriable() && attempt < max_retries => {
                tracing::warn!(attempt, error = %e, "retriable provider error");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Other("retries exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retriable_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<&str> = with_retries(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Provider {
                        provider: "gemini".into(),
                        message: "503".into(),
                        retriable: true,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Auth("bad key".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
