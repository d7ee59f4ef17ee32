use crate::traits::{CompletionClient, CompletionError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Outer bound on one pair: two 60s attempts plus slack.
pub const DEFAULT_PAIR_TIMEOUT: Duration = Duration::from_secs(130);

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Pair timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("Semaphore error: {0}")]
    Closed(String),
}

/// Runs completion calls under a permit budget and a per-pair deadline.
///
/// With a limit of 1 at most one call is in flight, which is what the
/// sequential batch mode relies on.
#[derive(Clone)]
pub struct PairExecutor {
    semaphore: Arc<Semaphore>,
    limit: usize,
    pair_timeout: Duration,
}

impl PairExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        let limit = concurrency_limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            pair_timeout: DEFAULT_PAIR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, pair_timeout: Duration) -> Self {
        self.pair_timeout = pair_timeout;
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.limit
    }

    pub fn pair_timeout(&self) -> Duration {
        self.pair_timeout
    }

    #[instrument(skip_all, fields(model = %client.model()))]
    pub async fn execute(
        &self,
        client: &dyn CompletionClient,
        prompt: &str,
    ) -> Result<String, ExecutorError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ExecutorError::Closed(e.to_string()))?;

        debug!(prompt_chars = prompt.chars().count(), "Sending completion request");

        let raw = timeout(self.pair_timeout, client.complete(prompt))
            .await
            .map_err(|_| ExecutorError::Timeout(self.pair_timeout.as_secs()))??;

        debug!(response_chars = raw.chars().count(), "Completion received");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowClient {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for SlowClient {
        fn model(&self) -> &str {
            "slow"
        }

        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("echo:{prompt}"))
        }
    }

    fn slow(delay_ms: u64) -> Arc<SlowClient> {
        Arc::new(SlowClient {
            delay: Duration::from_millis(delay_ms),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_execute_returns_raw_text() {
        let executor = PairExecutor::new(1);
        let client = slow(1);
        let raw = executor.execute(client.as_ref(), "hi").await.unwrap();
        assert_eq!(raw, "echo:hi");
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let executor = PairExecutor::new(1).with_timeout(Duration::from_millis(20));
        let client = slow(500);
        let err = executor.execute(client.as_ref(), "hi").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_permit_budget_caps_in_flight_calls() {
        let executor = PairExecutor::new(2);
        let client = slow(30);

        let mut handles = Vec::new();
        for i in 0..6 {
            let executor = executor.clone();
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                executor.execute(client.as_ref(), &i.to_string()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(client.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(PairExecutor::new(0).concurrency_limit(), 1);
    }
}
