use crate::types::{RelayError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times a step may run, how long to wait in between, and how long
/// a single attempt may take.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub const fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier: 2.0,
            timeout: None,
        }
    }

    /// A single attempt, no delay. Used for reads and pure steps.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.initial_delay.saturating_mul(32),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// The delays slept between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts.max(1))
            .map(|_| backoff.next_backoff().unwrap_or(self.initial_delay))
            .collect()
    }

    /// Runs `work` until it succeeds or the attempts are used up.
    ///
    /// Each attempt is bounded by `timeout` when one is set. With more than one
    /// attempt configured, the final error is wrapped in
    /// [`RelayError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, step: &str, mut work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, work()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RelayError::Timeout {
                        step: step.to_string(),
                        seconds: limit.as_secs(),
                    }),
                },
                None => work().await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(step, attempt, "Step succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.initial_delay);
                    warn!(step, attempt, ?delay, error = %e, "Step attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if attempts == 1 => return Err(e),
                Err(e) => {
                    return Err(RelayError::RetriesExhausted {
                        step: step.to_string(),
                        attempts,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

/// Retry policy per orchestrator step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicies {
    pub fetch: RetryPolicy,
    pub summarize: RetryPolicy,
    pub send: RetryPolicy,
    pub record: RetryPolicy,
    /// Cache reads and pure steps.
    pub local: RetryPolicy,
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            fetch: RetryPolicy::exponential(3, Duration::from_secs(5)),
            summarize: RetryPolicy::exponential(3, Duration::from_secs(5))
                .with_timeout(Duration::from_secs(60)),
            send: RetryPolicy::exponential(5, Duration::from_secs(10))
                .with_timeout(Duration::from_secs(120)),
            record: RetryPolicy::exponential(3, Duration::from_secs(3)),
            local: RetryPolicy::once(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn delays_double_from_initial() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(5));
        assert_eq!(policy.delays(), vec![Duration::from_secs(5), Duration::from_secs(10)]);

        let send = StepPolicies::default().send;
        assert_eq!(send.delays().len(), 4);
        assert_eq!(send.delays()[3], Duration::from_secs(80));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::exponential(3, Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("always fails", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RelayError::General("boom".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(RelayError::RetriesExhausted { attempts: 3, .. })));
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out_and_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::exponential(2, Duration::from_secs(1))
            .with_timeout(Duration::from_secs(10));

        let counter = calls.clone();
        let result = policy
            .run("slow then fast", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_attempt_returns_the_raw_error() {
        let result: Result<()> = RetryPolicy::once()
            .run("read", || async { Err(RelayError::EmptySummary) })
            .await;

        assert!(matches!(result, Err(RelayError::EmptySummary)));
    }
}
