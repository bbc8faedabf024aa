//! Bounded retry around `RequestExecutor` with a fixed inter-attempt delay.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::backend::ReferenceImage;
use crate::catalog::PromptSpec;
use crate::config::Config;
use crate::error::CredentialError;
use crate::job::{GeneratedImage, RequestExecutor};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Raised once by the first credential failure of a job; never lowered.
#[derive(Debug, Default)]
pub struct AbortFlag {
    raised: AtomicBool,
    notify: Notify,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Resolves once the flag is raised.
    pub async fn wait(&self) {
        loop {
            // Registered before the check so a concurrent raise is not missed
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    executor: RequestExecutor,
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(executor: RequestExecutor, max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { executor, max_attempts: max_attempts.max(1), delay }
    }

    pub fn with_defaults(executor: RequestExecutor) -> Self {
        Self::new(executor, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }

    pub fn from_config(executor: RequestExecutor, config: &Config) -> Self {
        Self::new(executor, config.max_attempts, config.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Try the prompt until it yields an image or attempts run out.
    ///
    /// Credential failures are returned on first sight and never retried.
    pub async fn attempt_with_retry(
        &self,
        references: &[ReferenceImage],
        prompt: &PromptSpec,
    ) -> Result<Option<GeneratedImage>, CredentialError> {
        self.attempt_unless_aborted(references, prompt, &AbortFlag::new()).await
    }

    /// Like `attempt_with_retry`, sharing an abort flag with sibling calls.
    ///
    /// A credential failure raises the flag. Once raised, no new attempt is
    /// started and a pending retry delay ends early. An attempt already in
    /// flight is never interrupted.
    pub async fn attempt_unless_aborted(
        &self,
        references: &[ReferenceImage],
        prompt: &PromptSpec,
        aborted: &AbortFlag,
    ) -> Result<Option<GeneratedImage>, CredentialError> {
        for attempt in 1..=self.max_attempts {
            if aborted.is_raised() {
                tracing::debug!(
                    category = %prompt.category,
                    "Job aborted, skipping attempt {}",
                    attempt
                );
                return Ok(None);
            }
            let outcome = match self.executor.attempt(references, prompt).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    aborted.raise();
                    return Err(err);
                }
            };
            if let Some(image) = outcome {
                if attempt > 1 {
                    tracing::info!(
                        category = %prompt.category,
                        "Prompt succeeded on attempt {}",
                        attempt
                    );
                }
                return Ok(Some(image));
            }
            if attempt < self.max_attempts {
                tracing::debug!(
                    category = %prompt.category,
                    "Attempt {} produced nothing, retrying in {:?}",
                    attempt,
                    self.delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = aborted.wait() => {}
                }
            }
        }
        tracing::warn!(
            category = %prompt.category,
            prompt = %prompt.text,
            "Giving up after {} attempts",
            self.max_attempts
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendImage, ImageBackend};
    use crate::catalog::Category;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Fails transiently until call number `succeed_on`, then returns an image.
    struct Flaky {
        calls: AtomicU32,
        succeed_on: u32,
        credential_failure: bool,
    }

    impl Flaky {
        fn new(succeed_on: u32) -> Arc<Self> {
            Arc::new(Flaky { calls: AtomicU32::new(0), succeed_on, credential_failure: false })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Flaky { calls: AtomicU32::new(0), succeed_on: 1, credential_failure: true })
        }
    }

    #[async_trait]
    impl ImageBackend for Flaky {
        async fn generate(
            &self,
            _: &[ReferenceImage],
            _: &str,
        ) -> Result<Option<BackendImage>, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.credential_failure {
                return Err(BackendError::Credential("API key not valid".to_string()));
            }
            if call >= self.succeed_on {
                let image =
                    BackendImage { data: "AA==".to_string(), mime_type: "image/png".to_string() };
                Ok(Some(image))
            } else {
                Err(BackendError::Request("overloaded".to_string()))
            }
        }
    }

    fn assert_delay(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        let upper = expected + Duration::from_millis(50);
        assert!(elapsed >= expected && elapsed < upper, "elapsed {:?}", elapsed);
    }

    fn prompt() -> PromptSpec {
        PromptSpec::new("prompt", Category::Overweight)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_delays() {
        let backend = Flaky::new(3);
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(backend.clone()));
        let started = Instant::now();
        let result = policy.attempt_with_retry(&[], &prompt()).await.unwrap();
        assert!(result.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_delay(started, DEFAULT_RETRY_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_absent_without_trailing_delay() {
        let backend = Flaky::new(u32::MAX);
        let delay = Duration::from_millis(500);
        let policy = RetryPolicy::new(RequestExecutor::new(backend.clone()), 3, delay);
        let started = Instant::now();
        assert_eq!(policy.attempt_with_retry(&[], &prompt()).await, Ok(None));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_delay(started, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn credential_failure_stops_after_one_call() {
        let backend = Flaky::rejecting();
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(backend.clone()));
        let started = Instant::now();
        assert!(policy.attempt_with_retry(&[], &prompt()).await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn raised_abort_flag_skips_the_call() {
        let backend = Flaky::new(1);
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(backend.clone()));
        let aborted = AbortFlag::new();
        aborted.raise();
        assert_eq!(policy.attempt_unless_aborted(&[], &prompt(), &aborted).await, Ok(None));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_failure_raises_abort_flag() {
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(Flaky::rejecting()));
        let aborted = AbortFlag::new();
        assert!(policy.attempt_unless_aborted(&[], &prompt(), &aborted).await.is_err());
        assert!(aborted.is_raised());
    }

    #[tokio::test(start_paused = true)]
    async fn sibling_abort_cuts_retry_delay_short() {
        let backend = Flaky::new(u32::MAX);
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(backend.clone()));
        let aborted = AbortFlag::new();
        let prompt = prompt();
        let started = Instant::now();

        let sibling = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            aborted.raise();
        };
        let (outcome, ()) =
            tokio::join!(policy.attempt_unless_aborted(&[], &prompt, &aborted), sibling);

        assert_eq!(outcome, Ok(None));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_delay(started, Duration::from_millis(100));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(RequestExecutor::new(Flaky::new(1)), 0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }
}
