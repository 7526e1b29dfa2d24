use rand::Rng;
use std::future::Future;
use tokio::time::{sleep, Duration};

use super::client::FetchError;
use crate::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;

/// Backoff for provider calls: `base * 2^attempt`, capped, with a
/// symmetric jitter of `jitter` times the capped delay.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 2, base: Duration::from_millis(250), cap: Duration::from_secs(4), jitter: 0.3 }
    }
}

impl RetryConfig {
    pub fn with_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let doubled = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = doubled.min(self.cap).as_secs_f64();
        let spread = capped * self.jitter;
        let offset = if spread > 0.0 { rng.gen_range(-spread..=spread) } else { 0.0 };
        Duration::from_secs_f64((capped + offset).max(0.0))
    }
}

/// Retry a provider call. Non-retryable failures (bad request, auth, decode)
/// return immediately.
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                log(
                    Level::Warn,
                    Domain::Market,
                    "retry",
                    obj(&[
                        ("operation", v_str(operation_name)),
                        ("attempt", json!(attempt + 1)),
                        ("max_attempts", json!(config.max_retries + 1)),
                        ("error", v_str(&e.to_string())),
                        ("delay_ms", json!(delay.as_millis() as u64)),
                    ]),
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn is_retryable_http_error(status: u16) -> bool {
    matches!(status,
        408 |   // Request Timeout
        429 |   // Too Many Requests
        500 |   // Internal Server Error
        502 |   // Bad Gateway
        503 |   // Service Unavailable
        504     // Gateway Timeout
    )
}

pub fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
