use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::models::RetryConfig;

/// Run `op` with exponential backoff: base delay, doubling each attempt
/// up to `max_delay_ms`, capped at `max_attempts` total tries. Mirrors
/// the retry-loop shape already used for per-window LLM calls, but adds
/// the sleep between attempts (spec.md §5 "Retries").
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay_ms = config.base_delay_ms;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{label}: attempt {attempt}/{} failed: {e}", config.max_attempts);
                last_error = Some(e);
                if attempt < config.max_attempts {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = ((delay_ms as f64) * config.backoff_factor) as u64;
                    delay_ms = delay_ms.min(config.max_delay_ms);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{label}: exhausted retries with no recorded error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = RetryConfig { base_delay_ms: 1, backoff_factor: 2.0, max_delay_ms: 10, max_attempts: 4 };
        let calls = AtomicU32::new(0);
        let result = with_backoff(&config, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let config = RetryConfig { base_delay_ms: 1, backoff_factor: 2.0, max_delay_ms: 10, max_attempts: 3 };
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = with_backoff(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(anyhow::anyhow!("always fails")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
