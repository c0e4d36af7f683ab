use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;

/// Attempts, backoff and per-call timeout for one provider in a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) backoff: Duration,
    pub(crate) timeout: Duration,
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Which provider call is being retried, for logs and metrics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSite<'a> {
    pub(crate) capability: &'static str,
    pub(crate) provider: &'a str,
    pub(crate) submission_id: &'a str,
}

/// Runs `call` until it succeeds or the policy's attempts run out. A call
/// that exceeds the timeout counts as a failed attempt.
pub(crate) async fn with_retries<T, F, Fut>(
    site: CallSite<'_>,
    policy: RetryPolicy,
    mut call: F,
) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = anyhow!("{} provider {} was not called", site.capability, site.provider);

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, call(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {:?}", policy.timeout)),
        };

        match result {
            Ok(value) => {
                metrics::counter!(
                    "provider_attempts_total",
                    "capability" => site.capability,
                    "provider" => site.provider.to_string(),
                    "outcome" => "success"
                )
                .increment(1);
                tracing::debug!(
                    capability = site.capability,
                    provider = site.provider,
                    attempt,
                    submission_id = %site.submission_id,
                    "Provider call succeeded"
                );
                return Ok(value);
            }
            Err(err) => {
                metrics::counter!(
                    "provider_attempts_total",
                    "capability" => site.capability,
                    "provider" => site.provider.to_string(),
                    "outcome" => "failure"
                )
                .increment(1);
                tracing::warn!(
                    capability = site.capability,
                    provider = site.provider,
                    attempt,
                    attempts,
                    submission_id = %site.submission_id,
                    error = %format!("{err:#}"),
                    "Provider call failed"
                );
                last_error = err;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(last_error)
}
