//! Shared outbound HTTP setup: one `reqwest::Client` with fixed timeouts
//! and a fixed-delay retry loop for idempotent calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::Error;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client() -> Result<reqwest::Client, Error> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Attempts after the first one, and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3, delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { retries: 0, delay: Duration::ZERO }
    }
}

/// Runs `op` until it succeeds or the policy is exhausted; the last error is returned.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                warn!("{} failed ({}), retry {}/{}", label, e, attempt, policy.retries);
                sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
