//! Broker pacing: fundamental-data calls (and, conservatively, every call
//! through the same session) are throttled to <= 30 requests per 60 s
//! sliding window, grounded on the teacher's `OrderThrottler` sliding-window
//! counter (§4.4).

use crate::domain::errors::BrokerError;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::warn;

const BACKOFF_SCHEDULE: [Duration; 3] = [Duration::from_secs(5), Duration::from_secs(10), Duration::from_secs(20)];

pub struct Pacer {
    recent: Mutex<VecDeque<Instant>>,
    max_per_window: usize,
    window: Duration,
}

impl Pacer {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            max_per_window,
            window,
        }
    }

    pub fn standard() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Blocks until the sliding window has capacity, then records this call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut recent = self.recent.lock().await;
                let cutoff = Instant::now() - self.window;
                while recent.front().is_some_and(|t| *t < cutoff) {
                    recent.pop_front();
                }
                if recent.len() < self.max_per_window {
                    recent.push_back(Instant::now());
                    None
                } else {
                    recent.front().map(|oldest| (*oldest + self.window).saturating_duration_since(Instant::now()))
                }
            };
            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }

    /// Runs `operation`, retrying on [`BrokerError::Pacing`] with the fixed
    /// 5s/10s/20s backoff schedule (max 3 retries, per §4.4).
    pub async fn with_retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let mut attempts = 0u32;
        loop {
            self.acquire().await;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(BrokerError::Pacing { operation, attempts: _ }) if (attempts as usize) < BACKOFF_SCHEDULE.len() => {
                    let backoff = BACKOFF_SCHEDULE[attempts as usize];
                    warn!(operation = %operation_name, %operation, attempt = attempts + 1, ?backoff, "broker pacing violation, backing off");
                    sleep(backoff).await;
                    attempts += 1;
                }
                Err(BrokerError::Pacing { operation, attempts: a }) => {
                    return Err(BrokerError::Pacing { operation, attempts: a });
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_does_not_block_under_limit() {
        let pacer = Pacer::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..5 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn acquire_blocks_until_window_capacity_frees() {
        let pacer = Pacer::new(2, Duration::from_millis(100));
        pacer.acquire().await;
        pacer.acquire().await;
        let start = Instant::now();
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn with_retry_gives_up_after_three_pacing_errors() {
        let pacer = Pacer::new(100, Duration::from_secs(60));
        let mut calls = 0;
        let result: Result<(), BrokerError> = pacer
            .with_retry("reqFundamentalData", || {
                calls += 1;
                async move {
                    Err(BrokerError::Pacing {
                        operation: "reqFundamentalData".into(),
                        attempts: 0,
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_pacing_error() {
        let pacer = Pacer::new(100, Duration::from_secs(60));
        let mut calls = 0;
        let result = pacer
            .with_retry("qualify", || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 2 {
                        Err(BrokerError::Pacing { operation: "qualify".into(), attempts: 0 })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
    }
}
