//! Failure classification and recovery for generation calls.
//!
//! Two independent mechanisms layer here:
//!
//! - quota/rate-limit errors rotate through the configured api-key pool,
//!   invisible to the user unless every key is exhausted;
//! - transient overload drives a bounded, author-gated retry loop whose UI
//!   is abstracted behind [`RetryUi`], so the coordinator owns the policy
//!   (attempt bound, idle timeout) and the caller owns the widgets.
//!
//! Callers always get either a payload or a classified terminal error.

use banter_llm::GeminiError;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

pub const MAX_RETRY_ATTEMPTS: u32 = 5;
pub const RETRY_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum RetryError {
    /// Every key in the pool reported quota exhaustion during one sweep.
    #[error("all {pool_size} api key(s) exhausted their quota")]
    PoolExhausted { pool_size: usize },

    /// Every key in the pool reported the free-tier restriction; no amount
    /// of rotation will help, a different key tier is required.
    #[error("this feature requires a paid api key on at least one configured key")]
    PaidTierOnly,

    /// The overload retry loop hit its attempt bound.
    #[error("the model was still overloaded after {attempts} attempt(s)")]
    RetriesExhausted { attempts: u32 },

    /// The requester never pressed retry within the idle window.
    #[error("retry abandoned after {0:?} of inactivity")]
    IdleTimeout(Duration),

    /// Overload on a path with no retry affordance (detached calls).
    #[error("the model is overloaded right now; try again shortly")]
    StillOverloaded,

    #[error(transparent)]
    Fatal(#[from] GeminiError),
}

/// Ordered credential pool with a persistent rotation cursor. The cursor
/// survives across calls so a key that just exhausted its quota is not the
/// first one tried next time.
pub struct KeyPool {
    keys: Vec<String>,
    cursor: Mutex<usize>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> anyhow::Result<Self> {
        if keys.is_empty() {
            return Err(anyhow::anyhow!("api key pool is empty"));
        }
        Ok(Self {
            keys,
            cursor: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current(&self) -> String {
        let cursor = self.cursor.lock().expect("key pool lock poisoned");
        self.keys[*cursor].clone()
    }

    /// Advance to the next key (wrapping) and return it.
    pub fn advance(&self) -> String {
        let mut cursor = self.cursor.lock().expect("key pool lock poisoned");
        *cursor = (*cursor + 1) % self.keys.len();
        self.keys[*cursor].clone()
    }
}

/// How the retry affordance resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPrompt {
    Pressed,
    TimedOut,
}

/// User-visible side of the overload loop, decoupled from any platform
/// widget. Implementations gate `wait_for_retry` to the original requester.
#[async_trait::async_trait]
pub trait RetryUi: Send + Sync {
    /// Show or refresh the failure indicator; `attempt` counts failures so far.
    async fn notify_overloaded(&self, attempt: u32);

    /// Resolve when the requester presses retry or the idle window elapses.
    async fn wait_for_retry(&self, idle_timeout: Duration) -> RetryPrompt;

    /// Tear down the failure indicator after a later attempt succeeded.
    async fn clear_indicator(&self);
}

/// A `RetryUi` for paths with no interactive affordance; never retries.
pub struct NoRetryUi;

#[async_trait::async_trait]
impl RetryUi for NoRetryUi {
    async fn notify_overloaded(&self, _attempt: u32) {}

    async fn wait_for_retry(&self, _idle_timeout: Duration) -> RetryPrompt {
        RetryPrompt::TimedOut
    }

    async fn clear_indicator(&self) {}
}

pub struct RetryCoordinator {
    keys: KeyPool,
    max_attempts: u32,
    idle_timeout: Duration,
}

impl RetryCoordinator {
    pub fn new(keys: KeyPool) -> Self {
        Self {
            keys,
            max_attempts: MAX_RETRY_ATTEMPTS,
            idle_timeout: RETRY_IDLE_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, max_attempts: u32, idle_timeout: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.keys.len()
    }

    /// Full recovery loop: quota rotation inside each attempt, the
    /// author-gated retry affordance between overloaded attempts.
    ///
    /// `call` receives the api key to use and must re-construct the same
    /// request each time; on `Ok` the caller performs its deferred history
    /// update and registry track exactly once.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run<T, F, Fut>(&self, ui: &dyn RetryUi, call: F) -> Result<T, RetryError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = banter_llm::Result<T>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.sweep_pool(&call).await {
                Ok(value) => {
                    if attempts > 1 {
                        ui.clear_indicator().await;
                    }
                    return Ok(value);
                }
                Err(SweepError::Overloaded(message)) => {
                    tracing::warn!(attempts, %message, "generation overloaded");
                    if attempts >= self.max_attempts {
                        return Err(RetryError::RetriesExhausted { attempts });
                    }
                    ui.notify_overloaded(attempts).await;
                    match ui.wait_for_retry(self.idle_timeout).await {
                        RetryPrompt::Pressed => continue,
                        RetryPrompt::TimedOut => {
                            return Err(RetryError::IdleTimeout(self.idle_timeout));
                        }
                    }
                }
                Err(SweepError::Terminal(e)) => return Err(e),
            }
        }
    }

    /// Rotation-only variant for paths without a retry affordance
    /// (regeneration, one-shot commands). Overload is terminal here.
    pub async fn run_detached<T, F, Fut>(&self, call: F) -> Result<T, RetryError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = banter_llm::Result<T>>,
    {
        match self.sweep_pool(&call).await {
            Ok(value) => Ok(value),
            Err(SweepError::Overloaded(_)) => Err(RetryError::StillOverloaded),
            Err(SweepError::Terminal(e)) => Err(e),
        }
    }

    /// One pass over the key pool: try the current key, advance on quota
    /// errors, stop after every key was tried once. Never loops forever.
    async fn sweep_pool<T, F, Fut>(&self, call: &F) -> Result<T, SweepError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = banter_llm::Result<T>>,
    {
        let pool_size = self.keys.len();
        let mut key = self.keys.current();
        let mut all_paid_tier = true;

        for tried in 0..pool_size {
            match call(key.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_quota() => {
                    all_paid_tier &= e.is_paid_tier();
                    tracing::warn!(
                        %e,
                        tried = tried + 1,
                        pool_size,
                        "quota error; rotating api key"
                    );
                    key = self.keys.advance();
                }
                Err(e) if e.is_overloaded() => {
                    return Err(SweepError::Overloaded(e.to_string()));
                }
                Err(e) => return Err(SweepError::Terminal(RetryError::Fatal(e))),
            }
        }

        if all_paid_tier {
            Err(SweepError::Terminal(RetryError::PaidTierOnly))
        } else {
            Err(SweepError::Terminal(RetryError::PoolExhausted { pool_size }))
        }
    }
}

enum SweepError {
    Overloaded(String),
    Terminal(RetryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysPress;

    #[async_trait::async_trait]
    impl RetryUi for AlwaysPress {
        async fn notify_overloaded(&self, _attempt: u32) {}
        async fn wait_for_retry(&self, _idle_timeout: Duration) -> RetryPrompt {
            RetryPrompt::Pressed
        }
        async fn clear_indicator(&self) {}
    }

    fn coordinator(keys: &[&str]) -> RetryCoordinator {
        let pool = KeyPool::new(keys.iter().map(|k| k.to_string()).collect()).expect("pool");
        RetryCoordinator::new(pool)
    }

    #[tokio::test]
    async fn quota_errors_sweep_the_pool_once_then_stop() {
        let coordinator = coordinator(&["k1", "k2", "k3"]);
        let calls = AtomicU32::new(0);

        let result: Result<String, _> = coordinator
            .run(&AlwaysPress, |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GeminiError::QuotaExhausted("out".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3, "one attempt per key");
        assert!(matches!(
            result,
            Err(RetryError::PoolExhausted { pool_size: 3 })
        ));
    }

    #[tokio::test]
    async fn single_key_pool_fails_immediately_on_quota() {
        let coordinator = coordinator(&["only"]);
        let calls = AtomicU32::new(0);

        let result: Result<String, _> = coordinator
            .run_detached(|_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GeminiError::QuotaExhausted("out".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::PoolExhausted { pool_size: 1 })
        ));
    }

    #[tokio::test]
    async fn rotation_recovers_when_a_later_key_has_quota() {
        let coordinator = coordinator(&["k1", "k2"]);

        let result = coordinator
            .run(&AlwaysPress, |key| async move {
                if key == "k1" {
                    Err(GeminiError::QuotaExhausted("k1 out".to_string()))
                } else {
                    Ok("answer".to_string())
                }
            })
            .await;

        assert_eq!(result.expect("recovered on second key"), "answer");
        // Cursor stays on the working key for the next call.
        assert_eq!(coordinator.keys.current(), "k2");
    }

    #[tokio::test]
    async fn paid_tier_on_every_key_is_its_own_terminal_error() {
        let coordinator = coordinator(&["k1", "k2"]);

        let result: Result<String, _> = coordinator
            .run_detached(|_key| async {
                Err(GeminiError::PaidTierRequired("billed users only".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::PaidTierOnly)));
    }

    #[tokio::test]
    async fn mixed_quota_and_paid_tier_reports_pool_exhausted() {
        let coordinator = coordinator(&["k1", "k2"]);

        let result: Result<String, _> = coordinator
            .run_detached(|key| async move {
                if key == "k1" {
                    Err(GeminiError::PaidTierRequired("billed".to_string()))
                } else {
                    Err(GeminiError::QuotaExhausted("out".to_string()))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::PoolExhausted { pool_size: 2 })
        ));
    }

    #[tokio::test]
    async fn transient_overload_twice_then_success_returns_once() {
        let coordinator = coordinator(&["k1"]);
        let calls = AtomicU32::new(0);

        let result = coordinator
            .run(&AlwaysPress, |_key| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(GeminiError::Overloaded("503".to_string()))
                    } else {
                        Ok("finally".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), "finally");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn overload_attempts_are_bounded() {
        let coordinator = coordinator(&["k1"]).with_limits(3, RETRY_IDLE_TIMEOUT);
        let calls = AtomicU32::new(0);

        let result: Result<String, _> = coordinator
            .run(&AlwaysPress, |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GeminiError::Overloaded("503".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(RetryError::RetriesExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn unattended_ui_times_out_instead_of_looping() {
        let coordinator = coordinator(&["k1"]);
        let result: Result<String, _> = coordinator
            .run(&NoRetryUi, |_key| async {
                Err(GeminiError::Overloaded("503".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::IdleTimeout(_))));
    }

    #[tokio::test]
    async fn fatal_errors_surface_immediately() {
        let coordinator = coordinator(&["k1", "k2"]);
        let calls = AtomicU32::new(0);

        let result: Result<String, _> = coordinator
            .run(&AlwaysPress, |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GeminiError::InvalidInput("bad request".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "no rotation for fatal errors");
        assert!(matches!(result, Err(RetryError::Fatal(_))));
    }
}
