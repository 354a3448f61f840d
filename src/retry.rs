use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f32,
    /// D' = D * (1 + U[-j, +j])
    pub jitter: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f32 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_millis() as f32);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Duration::from_millis(capped as u64);
        }
        let scale: f32 = rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_millis((capped * (1.0 + scale)).max(0.0) as u64)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or attempts run out.
    ///
    /// Rate limiting and quota errors are never transient, so they return on the first hit.
    pub async fn run<T, Op, Fut>(&self, label: &str, mut op: Op) -> Result<T, PipelineError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Err(e) if e.is_transient() && attempt + 1 < max => {
                    let delay = self.delay(attempt);
                    warn!(call = label, attempt, delay_ms = delay.as_millis() as u64, error = %e, "🔄 Transient upstream failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ErrorKind;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(250));
        assert_eq!(policy.delay(9), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(400),
            max_backoff: Duration::from_secs(10),
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.delay(0).as_millis();
            assert!((199..=601).contains(&d), "delay {d}");
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out = fast(3)
            .run("test", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 { Err(PipelineError::from_status(503)) } else { Ok("done") }
                }
            })
            .await;
        assert_eq!(out, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = fast(2)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::from_status(500)) }
            })
            .await;
        assert_eq!(out.unwrap_err().kind, ErrorKind::Upstream);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_quota_and_client_errors_are_not_retried() {
        for status in [429, 402, 400] {
            let calls = AtomicU32::new(0);
            let out: Result<(), _> = fast(5)
                .run("test", |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(PipelineError::from_status(status)) }
                })
                .await;
            assert!(out.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1, "status {status}");
        }
    }

    #[tokio::test]
    async fn empty_results_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = fast(5)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::empty("nothing")) }
            })
            .await;
        assert_eq!(out.unwrap_err().kind, ErrorKind::EmptyResult);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let calls = AtomicU32::new(0);
        let _ = RetryPolicy { max_attempts: 1, ..RetryPolicy::default() }
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PipelineError::from_status(503)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
