//! Shared HTTP plumbing for the adapter clients.
//!
//! One retry policy covers every adapter: transient failures (transport
//! errors, 5xx, 429) back off exponentially with jitter, honoring an
//! advertised `Retry-After`; other 4xx fail fast. Rate limiting that
//! survives every attempt degrades to a transport error, so stages only
//! ever see terminal outcomes.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::AdapterError;

/// Retry/backoff settings shared by the adapter clients.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per logical call (first try included).
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (single attempt).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Whether an adapter failure is worth retrying.
pub fn is_transient(err: &AdapterError) -> bool {
    matches!(
        err,
        AdapterError::Transport { .. } | AdapterError::RateLimited { .. }
    )
}

/// Compute the delay before the next attempt.
///
/// An advertised retry-after wins; otherwise exponential backoff from
/// the base delay with up to 25% jitter, capped at the policy ceiling.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, retry_after: Option<u64>) -> Duration {
    if let Some(secs) = retry_after {
        return Duration::from_secs(secs);
    }
    let exp = policy
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exp.min(policy.max_delay_ms);
    let jitter = if capped > 0 {
        rand::thread_rng().gen_range(0..=capped / 4)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Drive an adapter call through the retry policy.
///
/// `op` is invoked up to `max_attempts` times. Non-transient errors
/// return immediately; a rate limit that survives the final attempt is
/// degraded to a transport error.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt + 1 < policy.max_attempts => {
                let retry_after = match &err {
                    AdapterError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = backoff_delay(policy, attempt, retry_after);
                tracing::debug!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient adapter failure, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(AdapterError::RateLimited { .. }) => {
                return Err(AdapterError::Transport {
                    message: format!(
                        "{label}: rate limited after {} attempts",
                        policy.max_attempts
                    ),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Build a reqwest client with the given per-request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Map a non-success HTTP response to a typed adapter error.
///
/// 429 carries the advertised retry-after; 5xx is a (retryable)
/// transport failure; any other status is a fail-fast bad response.
pub async fn map_error_response(response: reqwest::Response) -> AdapterError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    match status {
        429 => AdapterError::RateLimited { retry_after },
        s if s >= 500 => AdapterError::Transport {
            message: format!("HTTP {s}: {body}"),
        },
        _ => AdapterError::BadResponse {
            status,
            message: body,
        },
    }
}

/// Map a reqwest transport failure to an adapter error.
pub fn map_transport_error(err: &reqwest::Error) -> AdapterError {
    AdapterError::Transport {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn backoff_honors_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(
            backoff_delay(&policy, 0, Some(42)),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        let d0 = backoff_delay(&policy, 0, None);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(125));
        let d4 = backoff_delay(&policy, 4, None);
        assert!(d4 <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::Transport {
                        message: "flaky".to_string(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AdapterError::BadResponse {
                    status: 403,
                    message: "forbidden".to_string(),
                })
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(AdapterError::BadResponse { status: 403, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_degrades_to_transport() {
        let result: Result<(), _> = with_retries(&fast_policy(2), "search", || async {
            Err(AdapterError::RateLimited {
                retry_after: Some(0),
            })
        })
        .await;
        match result {
            Err(AdapterError::Transport { message }) => {
                assert!(message.contains("rate limited after 2 attempts"));
            }
            other => panic!("expected Transport, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_exhaustion_returns_last_error() {
        let result: Result<(), _> = with_retries(&fast_policy(2), "test", || async {
            Err(AdapterError::Transport {
                message: "refused".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(AdapterError::Transport { .. })));
    }
}
